use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use circle_db::DbError;
use circle_types::api::{Claims, PageQuery, UpdateProfileRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::storage::{check_attachable, remove_owned};
use crate::views;

const MAX_DISPLAY_NAME: usize = 64;
const MAX_BIO: usize = 500;

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let user = state
        .db_call(move |db| {
            db.get_user_by_id(&uid)?
                .ok_or_else(|| DbError::not_found("User", uid))
        })
        .await?;
    Ok(Json(views::user_profile(user, true)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.display_name.as_deref().is_some_and(|n| n.chars().count() > MAX_DISPLAY_NAME) {
        return Err(ApiError::bad_request("display_name is too long"));
    }
    if req.bio.as_deref().is_some_and(|b| b.chars().count() > MAX_BIO) {
        return Err(ApiError::bad_request("bio is too long"));
    }
    check_attachable(&state, req.avatar_url.as_deref(), claims.sub).await?;

    let uid = claims.sub.to_string();
    let user = state
        .db_call(move |db| {
            db.update_profile(
                &uid,
                req.display_name.as_deref(),
                req.bio.as_deref(),
                req.avatar_url.as_deref(),
            )
        })
        .await?;
    Ok(Json(views::user_profile(user, true)))
}

/// Deletes the caller's account and everything hanging off it.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let avatar = state
        .db_call(move |db| {
            let user = db.get_user_by_id(&uid)?.ok_or_else(|| DbError::not_found("User", uid.as_str()))?;
            db.delete_user(&uid)?;
            Ok(user.avatar_url)
        })
        .await?;

    if let Some(url) = avatar {
        remove_owned(&state, &url, claims.sub).await;
    }

    info!("{} ({}) deleted their account", claims.username, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let uid = user_id.to_string();
    let user = state
        .db_call(move |db| {
            db.get_user_by_id(&uid)?
                .ok_or_else(|| DbError::not_found("User", uid))
        })
        .await?;
    Ok(Json(views::user_profile(user, user_id == claims.sub)))
}

pub async fn list_user_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = views::page_params(query);
    let page = params.clone();
    let author = user_id.to_string();
    let viewer = claims.sub.to_string();
    let rows = state
        .db_call(move |db| {
            db.get_user_by_id(&author)?
                .ok_or_else(|| DbError::not_found("User", author.as_str()))?;
            db.list_user_posts(&author, &viewer, &page)
        })
        .await?;
    Ok(Json(views::page(rows, &params, |r| r.id.as_str(), views::post)))
}
