use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a stored enum tag does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    /// Only populated when the profile belongs to the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// -- Friendships --

/// Lifecycle of a pairwise relationship.
///
/// `Rejected` and `Unfriended` are terminal for the current request but the
/// row is reused when either side sends a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
    Unfriended,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Unfriended => "UNFRIENDED",
        }
    }

    /// Terminal rows can be overwritten by a fresh request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Unfriended)
    }
}

impl fmt::Display for FriendshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FriendshipStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            "UNFRIENDED" => Ok(Self::Unfriended),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub receiver_id: Uuid,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
}

/// A friendship seen from one side: the other party plus the record it hangs off.
/// Used for friend lists as well as sent/received request lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendLink {
    pub friendship_id: Uuid,
    pub status: FriendshipStatus,
    pub user: UserProfile,
    pub created_at: DateTime<Utc>,
}

// -- Posts --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub liked_by_me: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Like,
    Comment,
    #[serde(rename = "FRIENDREQUEST")]
    FriendRequest,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::Comment => "COMMENT",
            Self::FriendRequest => "FRIENDREQUEST",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIKE" => Ok(Self::Like),
            "COMMENT" => Ok(Self::Comment),
            "FRIENDREQUEST" => Ok(Self::FriendRequest),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Uuid,
    pub actor_username: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub friendship_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// -- Presence --

/// Presence payload, shared by the `user-status` broadcast and `GET /presence/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}
