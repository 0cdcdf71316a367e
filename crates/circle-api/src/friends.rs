use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use circle_db::DbError;
use circle_types::api::{Claims, FriendCounts, PageQuery, SendRequestResponse};

use crate::error::{ApiError, ApiResult};
use crate::notifications::{Mention, notify};
use crate::state::AppState;
use crate::views;

/// POST /friends/requests/{user_id}: send a request to `user_id`.
pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(receiver): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if receiver == claims.sub {
        return Err(ApiError::bad_request("cannot send a friend request to yourself"));
    }

    let requester_id = claims.sub.to_string();
    let receiver_id = receiver.to_string();
    let friendship_id = state
        .db_call(move |db| {
            db.get_user_by_id(&receiver_id)?
                .ok_or_else(|| DbError::not_found("User", receiver_id.as_str()))?;
            db.request_friendship(&Uuid::new_v4().to_string(), &requester_id, &receiver_id)
        })
        .await?;

    info!("{} ({}) sent a friend request to {}", claims.username, claims.sub, receiver);

    notify(
        &state,
        receiver,
        claims.sub,
        Mention {
            friendship_id: Some(friendship_id.clone()),
            ..Default::default()
        },
    )
    .await;

    let friendship_id = friendship_id
        .parse()
        .map_err(|_| ApiError::internal(format!("corrupt friendship id '{}'", friendship_id)))?;
    Ok((StatusCode::CREATED, Json(SendRequestResponse { friendship_id })))
}

/// DELETE /friends/requests/{user_id}: withdraw a pending request sent to `user_id`.
pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(receiver): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let requester_id = claims.sub.to_string();
    let receiver_id = receiver.to_string();
    let row = state
        .db_call(move |db| db.cancel_friend_request(&requester_id, &receiver_id))
        .await?;
    Ok(Json(views::friendship(row)))
}

/// POST /friends/requests/{user_id}/accept: `user_id` is the requester.
pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(requester): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let receiver_id = claims.sub.to_string();
    let requester_id = requester.to_string();
    let row = state
        .db_call(move |db| db.accept_friend_request(&receiver_id, &requester_id))
        .await?;

    info!("{} ({}) accepted {}", claims.username, claims.sub, requester);
    Ok(Json(views::friendship(row)))
}

/// POST /friends/requests/{user_id}/reject: `user_id` is the requester.
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(requester): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let receiver_id = claims.sub.to_string();
    let requester_id = requester.to_string();
    let row = state
        .db_call(move |db| db.reject_friend_request(&receiver_id, &requester_id))
        .await?;
    Ok(Json(views::friendship(row)))
}

/// DELETE /friends/{user_id}
pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(other): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub.to_string();
    let them = other.to_string();
    let row = state
        .db_call(move |db| db.remove_friend(&me, &them))
        .await?;
    Ok(Json(views::friendship(row)))
}

/// GET /friends/status/{user_id}: the record between the caller and
/// `user_id`, or `null` when they have never interacted.
pub async fn friendship_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(other): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub.to_string();
    let them = other.to_string();
    let row = state
        .db_call(move |db| db.friendship_between(&me, &them))
        .await?;
    Ok(Json(row.map(views::friendship)))
}

pub async fn counts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let counts = state
        .db_call(move |db| {
            Ok(FriendCounts {
                friends: db.count_friends(&uid)?,
                received_requests: db.count_received_requests(&uid)?,
                sent_requests: db.count_sent_requests(&uid)?,
            })
        })
        .await?;
    Ok(Json(counts))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = views::page_params(query);
    let page = params.clone();
    let uid = claims.sub.to_string();
    let rows = state
        .db_call(move |db| db.list_friends(&uid, &page))
        .await?;
    Ok(Json(views::page(rows, &params, |r| r.friendship_id.as_str(), views::friend_link)))
}

pub async fn list_received(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = views::page_params(query);
    let page = params.clone();
    let uid = claims.sub.to_string();
    let rows = state
        .db_call(move |db| db.list_received_requests(&uid, &page))
        .await?;
    Ok(Json(views::page(rows, &params, |r| r.friendship_id.as_str(), views::friend_link)))
}

pub async fn list_sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = views::page_params(query);
    let page = params.clone();
    let uid = claims.sub.to_string();
    let rows = state
        .db_call(move |db| db.list_sent_requests(&uid, &page))
        .await?;
    Ok(Json(views::page(rows, &params, |r| r.friendship_id.as_str(), views::friend_link)))
}

pub async fn suggestions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = views::page_params(query);
    let page = params.clone();
    let uid = claims.sub.to_string();
    let rows = state
        .db_call(move |db| db.list_suggestions(&uid, &page))
        .await?;
    Ok(Json(views::page(rows, &params, |r| r.id.as_str(), |row| views::user_profile(row, false))))
}
