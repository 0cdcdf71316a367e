//! Database row types: these map directly to SQLite rows.
//! Distinct from circle-types API models to keep the DB layer independent.
//! IDs and timestamps stay as the stored strings; enum columns are parsed.

use circle_types::models::{FriendshipStatus, NotificationType};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub last_seen: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct FriendshipRow {
    pub id: String,
    pub requester_id: String,
    pub receiver_id: String,
    pub status: FriendshipStatus,
    pub created_at: String,
}

/// A friendship joined with the user on the other side of it.
#[derive(Debug, Clone)]
pub struct FriendLinkRow {
    pub friendship_id: String,
    pub status: FriendshipStatus,
    pub created_at: String,
    pub user: UserRow,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub liked_by_viewer: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub actor_id: String,
    pub actor_username: String,
    pub kind: NotificationType,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub friendship_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

/// Input to the notification writer. One row is written per reference that is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub actor_id: &'a str,
    pub post_id: Option<&'a str>,
    pub comment_id: Option<&'a str>,
    pub friendship_id: Option<&'a str>,
}
