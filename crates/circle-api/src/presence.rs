use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use circle_types::api::Claims;

use crate::error::ApiResult;
use crate::state::{AppState, blocking};

/// POST /presence/online: mark the caller online (or renew the marker).
pub async fn go_online(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    state.presence.set_online(claims.sub);
    StatusCode::NO_CONTENT
}

/// POST /presence/offline: returns the status that was broadcast.
pub async fn go_offline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let presence = state.presence.clone();
    let status = blocking(move || presence.set_offline(claims.sub)).await?;
    Ok(Json(status))
}

pub async fn get_status(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let presence = state.presence.clone();
    let status = blocking(move || presence.status(user_id)).await?;
    Ok(Json(status))
}
