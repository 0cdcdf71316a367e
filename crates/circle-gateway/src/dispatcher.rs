use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use circle_types::events::GatewayEvent;

/// Manages connected clients and publishes events.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Pub/sub fan-out: every subscriber receives every published event
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to published events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to every subscriber. Fire-and-forget: having no
    /// subscribers is not an error and nothing is retried.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    /// A newer connection for the same user replaces the older one.
    pub async fn register_user_channel(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.user_channels.write().await.insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    /// Returns true when this connection was still the current one.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut channels = self.inner.user_channels.write().await;
        match channels.get(&user_id) {
            Some((stored_conn_id, _)) if *stored_conn_id == conn_id => {
                channels.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Send a targeted event to a specific user. Dropped if the user is not connected.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let channels = self.inner.user_channels.read().await;
        match channels.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circle_types::models::UserStatus;

    fn status_event(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::UserStatus(UserStatus {
            user_id,
            is_online: true,
            last_seen: None,
        })
    }

    #[test]
    fn broadcast_without_subscribers_is_fine() {
        let dispatcher = Dispatcher::new();
        dispatcher.broadcast(status_event(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn subscribers_receive_broadcasts() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let user_id = Uuid::new_v4();

        dispatcher.broadcast(status_event(user_id));

        match rx.recv().await.unwrap() {
            GatewayEvent::UserStatus(status) => assert_eq!(status.user_id, user_id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn stale_connection_cannot_unregister_newer_one() {
        let dispatcher = Dispatcher::new();
        let user_id = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(user_id).await;
        let (new_conn, mut new_rx) = dispatcher.register_user_channel(user_id).await;

        assert!(!dispatcher.unregister_user_channel(user_id, old_conn).await);

        assert!(dispatcher.send_to_user(user_id, status_event(user_id)).await);
        assert!(new_rx.recv().await.is_some());

        assert!(dispatcher.unregister_user_channel(user_id, new_conn).await);
        assert!(!dispatcher.send_to_user(user_id, status_event(user_id)).await);
    }
}
