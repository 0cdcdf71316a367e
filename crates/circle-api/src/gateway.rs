use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use serde::Deserialize;

use circle_gateway::connection;

use crate::auth::verify_token;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}

/// GET /gateway?token=<jwt>: the token is checked before the upgrade so
/// the socket starts out authenticated.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let claims = verify_token(&state.jwt_secret, &query.token).ok_or(ApiError::Unauthorized)?;

    let dispatcher = state.dispatcher.clone();
    let presence = state.presence.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, presence, claims.sub, claims.username)
    }))
}
