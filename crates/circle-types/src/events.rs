use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Notification, UserStatus};

/// Pub/sub channel carrying presence transitions.
pub const PRESENCE_CHANNEL: &str = "online-presence";

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    #[serde(rename = "ready")]
    Ready { user_id: Uuid, username: String },

    /// A user came online or went offline
    #[serde(rename = "user-status")]
    UserStatus(UserStatus),

    /// A notification row was written for the receiving user
    #[serde(rename = "notification")]
    NotificationCreate(Notification),
}

impl GatewayEvent {
    /// Returns the pub/sub channel this event is published on.
    /// Events that return `None` are delivered point-to-point only.
    pub fn channel(&self) -> Option<&'static str> {
        match self {
            Self::UserStatus(_) => Some(PRESENCE_CHANNEL),
            _ => None,
        }
    }

    /// Serialize as `{ "channel": .., "event": .., "payload": .. }`.
    pub fn to_envelope(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let (Some(channel), Some(obj)) = (self.channel(), value.as_object_mut()) {
            obj.insert("channel".into(), serde_json::Value::from(channel));
        }
        Ok(value)
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Renew the presence entry. Clients send this well inside the TTL window.
    Heartbeat,

    /// Subscribe to events for specific pub/sub channels.
    /// The server only forwards channel-scoped events for channels the
    /// client has subscribed to.
    Subscribe { channels: Vec<String> },
}
