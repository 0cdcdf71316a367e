use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

/// GET /health: liveness plus a trivial store round trip.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match state
        .db_call(|db| db.with_conn(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?)))
        .await
    {
        Ok(_) => true,
        Err(e) => {
            warn!("Health check store query failed: {}", e);
            false
        }
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "dbHealthy": db_healthy,
    }))
}
