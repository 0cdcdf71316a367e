//! Row → response conversions and the paged response envelope.
//!
//! Stored IDs and timestamps are strings; a value that fails to parse is
//! logged and replaced with a default rather than failing the whole page.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use circle_db::PageParams;
use circle_db::models::{CommentRow, FriendLinkRow, FriendshipRow, NotificationRow, PostRow, UserRow};
use circle_types::api::{Page, PageMeta, PageQuery};
use circle_types::models::{Comment, FriendLink, Friendship, Notification, Post, UserProfile};

fn uuid(raw: &str, field: &str, row_id: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", field, raw, row_id, e);
        Uuid::default()
    })
}

fn opt_uuid(raw: Option<&str>, field: &str, row_id: &str) -> Option<Uuid> {
    raw.map(|raw| uuid(raw, field, row_id))
}

fn timestamp(raw: &str, field: &str, row_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written outside the API may use SQLite's "YYYY-MM-DD HH:MM:SS".
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on row '{}': {}", field, raw, row_id, e);
            DateTime::default()
        })
}

/// Public profile. `email` is only filled in for the caller's own profile.
pub fn user_profile(row: UserRow, include_email: bool) -> UserProfile {
    UserProfile {
        id: uuid(&row.id, "id", &row.id),
        last_seen: row.last_seen.as_deref().map(|ts| timestamp(ts, "last_seen", &row.id)),
        created_at: timestamp(&row.created_at, "created_at", &row.id),
        email: include_email.then_some(row.email),
        username: row.username,
        display_name: row.display_name,
        bio: row.bio,
        avatar_url: row.avatar_url,
    }
}

pub fn friendship(row: FriendshipRow) -> Friendship {
    Friendship {
        id: uuid(&row.id, "id", &row.id),
        requester_id: uuid(&row.requester_id, "requester_id", &row.id),
        receiver_id: uuid(&row.receiver_id, "receiver_id", &row.id),
        status: row.status,
        created_at: timestamp(&row.created_at, "created_at", &row.id),
    }
}

pub fn friend_link(row: FriendLinkRow) -> FriendLink {
    FriendLink {
        friendship_id: uuid(&row.friendship_id, "friendship_id", &row.friendship_id),
        status: row.status,
        created_at: timestamp(&row.created_at, "created_at", &row.friendship_id),
        user: user_profile(row.user, false),
    }
}

pub fn post(row: PostRow) -> Post {
    Post {
        id: uuid(&row.id, "id", &row.id),
        author_id: uuid(&row.author_id, "author_id", &row.id),
        created_at: timestamp(&row.created_at, "created_at", &row.id),
        updated_at: timestamp(&row.updated_at, "updated_at", &row.id),
        author_username: row.author_username,
        content: row.content,
        image_url: row.image_url,
        likes_count: row.likes_count,
        comments_count: row.comments_count,
        liked_by_me: row.liked_by_viewer,
    }
}

pub fn comment(row: CommentRow) -> Comment {
    Comment {
        id: uuid(&row.id, "id", &row.id),
        post_id: uuid(&row.post_id, "post_id", &row.id),
        author_id: uuid(&row.author_id, "author_id", &row.id),
        created_at: timestamp(&row.created_at, "created_at", &row.id),
        author_username: row.author_username,
        content: row.content,
    }
}

pub fn notification(row: NotificationRow) -> Notification {
    Notification {
        id: uuid(&row.id, "id", &row.id),
        user_id: uuid(&row.user_id, "user_id", &row.id),
        actor_id: uuid(&row.actor_id, "actor_id", &row.id),
        post_id: opt_uuid(row.post_id.as_deref(), "post_id", &row.id),
        comment_id: opt_uuid(row.comment_id.as_deref(), "comment_id", &row.id),
        friendship_id: opt_uuid(row.friendship_id.as_deref(), "friendship_id", &row.id),
        created_at: timestamp(&row.created_at, "created_at", &row.id),
        actor_username: row.actor_username,
        kind: row.kind,
        read: row.read,
    }
}

pub fn page_params(query: PageQuery) -> PageParams {
    PageParams::new(query.limit, query.last_cursor)
}

/// Wrap a page of rows. `nextCursor` is the last row's ID when the page is
/// full, `null` otherwise.
pub fn page<R, T>(rows: Vec<R>, params: &PageParams, row_id: impl Fn(&R) -> &str, convert: impl Fn(R) -> T) -> Page<T> {
    let next_cursor = if rows.len() == params.limit as usize {
        rows.last().map(|r| row_id(r).to_string())
    } else {
        None
    };

    Page {
        data: rows.into_iter().map(convert).collect(),
        meta: PageMeta {
            next_cursor,
            unread_count: None,
        },
    }
}
