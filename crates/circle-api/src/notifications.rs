use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, warn};
use uuid::Uuid;

use circle_db::models::NewNotification;
use circle_types::api::{Claims, MarkAllReadResponse, PageQuery};
use circle_types::events::GatewayEvent;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::views;

/// What a notification points at. Each reference that is set becomes its own row.
#[derive(Debug, Default)]
pub(crate) struct Mention {
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub friendship_id: Option<String>,
}

/// Write notifications for `recipient` and push each one to their gateway
/// connection. The triggering action has already been committed, so
/// failures here are logged and swallowed.
pub(crate) async fn notify(state: &AppState, recipient: Uuid, actor: Uuid, mention: Mention) {
    let user_id = recipient.to_string();
    let actor_id = actor.to_string();
    let written = state
        .db_call(move |db| {
            db.create_notification(&NewNotification {
                user_id: &user_id,
                actor_id: &actor_id,
                post_id: mention.post_id.as_deref(),
                comment_id: mention.comment_id.as_deref(),
                friendship_id: mention.friendship_id.as_deref(),
            })
        })
        .await;

    let rows = match written {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Failed to notify {}: {}", recipient, e);
            return;
        }
    };

    for row in rows {
        let event = GatewayEvent::NotificationCreate(views::notification(row));
        if !state.dispatcher.send_to_user(recipient, event).await {
            debug!("{} not connected, notification stored only", recipient);
        }
    }
}

/// GET /notifications: newest first, with the unread count in `meta`.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = views::page_params(query);
    let page = params.clone();
    let uid = claims.sub.to_string();
    let (rows, unread) = state
        .db_call(move |db| db.list_notifications(&uid, &page))
        .await?;

    let mut body = views::page(rows, &params, |r| r.id.as_str(), views::notification);
    body.meta.unread_count = Some(unread);
    Ok(Json(body))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let nid = notification_id.to_string();
    state
        .db_call(move |db| db.mark_notification_read(&uid, &nid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let updated = state
        .db_call(move |db| db.mark_all_notifications_read(&uid))
        .await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
