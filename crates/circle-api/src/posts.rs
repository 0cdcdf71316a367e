use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use circle_db::DbError;
use circle_types::api::{Claims, CreateCommentRequest, CreatePostRequest, LikeResponse, PageQuery, UpdatePostRequest};

use crate::error::{ApiError, ApiResult};
use crate::notifications::{Mention, notify};
use crate::state::AppState;
use crate::storage::{check_attachable, remove_owned};
use crate::views;

const MAX_POST_LENGTH: usize = 5000;
const MAX_COMMENT_LENGTH: usize = 1000;

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_length(value: Option<&str>, max: usize, field: &str) -> ApiResult<()> {
    if value.is_some_and(|v| v.chars().count() > max) {
        return Err(ApiError::bad_request(format!("{} is too long", field)));
    }
    Ok(())
}

fn parse_author(raw: &str) -> ApiResult<Uuid> {
    raw.parse()
        .map_err(|_| ApiError::internal(format!("corrupt author id '{}'", raw)))
}

// -- Posts --

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = non_blank(req.content);
    let image_url = non_blank(req.image_url);
    if content.is_none() && image_url.is_none() {
        return Err(ApiError::bad_request("a post needs content or an image"));
    }
    check_length(content.as_deref(), MAX_POST_LENGTH, "content")?;
    check_attachable(&state, image_url.as_deref(), claims.sub).await?;

    let post_id = Uuid::new_v4().to_string();
    let author_id = claims.sub.to_string();
    let row = state
        .db_call(move |db| db.create_post(&post_id, &author_id, content.as_deref(), image_url.as_deref()))
        .await?;

    info!("{} ({}) created post {}", claims.username, claims.sub, row.id);
    Ok((StatusCode::CREATED, Json(views::post(row))))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let pid = post_id.to_string();
    let viewer = claims.sub.to_string();
    let row = state
        .db_call(move |db| {
            db.get_post(&pid, &viewer)?
                .ok_or_else(|| DbError::not_found("Post", pid))
        })
        .await?;
    Ok(Json(views::post(row)))
}

/// Author only.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<UpdatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    check_length(req.content.as_deref(), MAX_POST_LENGTH, "content")?;

    let pid = post_id.to_string();
    let viewer = claims.sub.to_string();
    let existing = state
        .db_call(move |db| {
            db.get_post(&pid, &viewer)?
                .ok_or_else(|| DbError::not_found("Post", pid))
        })
        .await?;
    if parse_author(&existing.author_id)? != claims.sub {
        return Err(ApiError::forbidden("only the author can edit a post"));
    }
    check_attachable(&state, req.image_url.as_deref(), claims.sub).await?;

    let pid = post_id.to_string();
    let viewer = claims.sub.to_string();
    let row = state
        .db_call(move |db| db.update_post(&pid, &viewer, req.content.as_deref(), req.image_url.as_deref()))
        .await?;
    Ok(Json(views::post(row)))
}

/// Author only. Likes, comments and notifications go with the post.
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let pid = post_id.to_string();
    let viewer = claims.sub.to_string();
    let existing = state
        .db_call(move |db| {
            db.get_post(&pid, &viewer)?
                .ok_or_else(|| DbError::not_found("Post", pid))
        })
        .await?;
    if parse_author(&existing.author_id)? != claims.sub {
        return Err(ApiError::forbidden("only the author can delete a post"));
    }

    let pid = post_id.to_string();
    state.db_call(move |db| db.delete_post(&pid)).await?;

    if let Some(url) = existing.image_url {
        remove_owned(&state, &url, claims.sub).await;
    }

    info!("{} ({}) deleted post {}", claims.username, claims.sub, post_id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /posts/feed: the caller's posts plus those of accepted friends.
pub async fn feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = views::page_params(query);
    let page = params.clone();
    let viewer = claims.sub.to_string();
    let rows = state
        .db_call(move |db| db.list_feed(&viewer, &page))
        .await?;
    Ok(Json(views::page(rows, &params, |r| r.id.as_str(), views::post)))
}

// -- Likes --

pub async fn like_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let (likes_count, post) = state
        .db_call(move |db| {
            let count = db.like_post(&pid, &uid)?;
            let post = db.get_post(&pid, &uid)?.ok_or_else(|| DbError::not_found("Post", pid.as_str()))?;
            Ok((count, post))
        })
        .await?;

    notify(
        &state,
        parse_author(&post.author_id)?,
        claims.sub,
        Mention {
            post_id: Some(post.id),
            ..Default::default()
        },
    )
    .await;

    Ok(Json(LikeResponse {
        liked: true,
        likes_count,
    }))
}

pub async fn unlike_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let likes_count = state
        .db_call(move |db| db.unlike_post(&pid, &uid))
        .await?;
    Ok(Json(LikeResponse {
        liked: false,
        likes_count,
    }))
}

// -- Comments --

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("comment cannot be empty"));
    }
    check_length(Some(&content), MAX_COMMENT_LENGTH, "content")?;

    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let (comment, post_author) = state
        .db_call(move |db| {
            let post = db.get_post(&pid, &uid)?.ok_or_else(|| DbError::not_found("Post", pid.as_str()))?;
            let comment = db.create_comment(&Uuid::new_v4().to_string(), &pid, &uid, &content)?;
            Ok((comment, post.author_id))
        })
        .await?;

    notify(
        &state,
        parse_author(&post_author)?,
        claims.sub,
        Mention {
            comment_id: Some(comment.id.clone()),
            ..Default::default()
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(views::comment(comment))))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = views::page_params(query);
    let page = params.clone();
    let pid = post_id.to_string();
    let viewer = claims.sub.to_string();
    let rows = state
        .db_call(move |db| {
            db.get_post(&pid, &viewer)?
                .ok_or_else(|| DbError::not_found("Post", pid.as_str()))?;
            db.list_comments(&pid, &page)
        })
        .await?;
    Ok(Json(views::page(rows, &params, |r| r.id.as_str(), views::comment)))
}

/// Comment author only.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let cid = comment_id.to_string();
    let existing = state
        .db_call(move |db| {
            db.get_comment(&cid)?
                .ok_or_else(|| DbError::not_found("Comment", cid))
        })
        .await?;
    if parse_author(&existing.author_id)? != claims.sub {
        return Err(ApiError::forbidden("only the author can delete a comment"));
    }

    let cid = comment_id.to_string();
    state.db_call(move |db| db.delete_comment(&cid)).await?;
    Ok(StatusCode::NO_CONTENT)
}
