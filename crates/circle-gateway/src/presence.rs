use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use circle_db::Database;
use circle_types::events::GatewayEvent;
use circle_types::models::UserStatus;

use crate::cache::TtlCache;
use crate::dispatcher::Dispatcher;

/// How long an online marker lives without being renewed.
pub const PRESENCE_TTL: Duration = Duration::from_secs(60);

const ONLINE_MARKER: &str = "online";

/// Cache key holding a user's online marker.
pub fn status_key(user_id: Uuid) -> String {
    format!("user:{}:status", user_id)
}

/// Online/offline tracking: a short-lived cache entry per user plus a
/// `user-status` broadcast on every explicit transition.
///
/// Entry expiry is not linked to any broadcast. A user whose offline path
/// never runs simply drops out of the cache when the TTL lapses.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    cache: TtlCache,
    db: Arc<Database>,
    dispatcher: Dispatcher,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self::with_ttl(db, dispatcher, PRESENCE_TTL)
    }

    pub fn with_ttl(db: Arc<Database>, dispatcher: Dispatcher, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                cache: TtlCache::new(),
                db,
                dispatcher,
                ttl,
            }),
        }
    }

    /// Write (or renew) the online marker, then broadcast `isOnline: true`.
    pub fn set_online(&self, user_id: Uuid) {
        self.inner
            .cache
            .set_ex(&status_key(user_id), ONLINE_MARKER, self.inner.ttl);

        debug!("{} online", user_id);
        self.inner.dispatcher.broadcast(GatewayEvent::UserStatus(UserStatus {
            user_id,
            is_online: true,
            last_seen: None,
        }));
    }

    /// Drop the online marker, persist `last_seen`, then broadcast
    /// `isOnline: false`. Nothing is broadcast if the store write fails.
    pub fn set_offline(&self, user_id: Uuid) -> circle_db::Result<UserStatus> {
        self.inner.cache.del(&status_key(user_id));

        // Stored with millisecond precision; report exactly what was stored.
        let now = Utc::now().trunc_subsecs(3);
        self.inner
            .db
            .set_last_seen(&user_id.to_string(), &now.to_rfc3339_opts(SecondsFormat::Millis, true))?;

        let status = UserStatus {
            user_id,
            is_online: false,
            last_seen: Some(now),
        };
        debug!("{} offline", user_id);
        self.inner
            .dispatcher
            .broadcast(GatewayEvent::UserStatus(status.clone()));
        Ok(status)
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.cache.get(&status_key(user_id)).is_some()
    }

    /// Current status: online while the marker is live, otherwise the stored `last_seen`.
    pub fn status(&self, user_id: Uuid) -> circle_db::Result<UserStatus> {
        if self.is_online(user_id) {
            return Ok(UserStatus {
                user_id,
                is_online: true,
                last_seen: None,
            });
        }

        let user = self
            .inner
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or_else(|| circle_db::DbError::not_found("User", user_id.to_string()))?;

        let last_seen = user.last_seen.as_deref().and_then(|raw| {
            raw.parse::<DateTime<Utc>>()
                .map_err(|e| warn!("Corrupt last_seen '{}' on user '{}': {}", raw, user.id, e))
                .ok()
        });

        Ok(UserStatus {
            user_id,
            is_online: false,
            last_seen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with_user() -> (PresenceTracker, Dispatcher, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "ana", "ana@example.com", "hash")
            .unwrap();
        let dispatcher = Dispatcher::new();
        (PresenceTracker::new(db, dispatcher.clone()), dispatcher, user_id)
    }

    fn expect_status(event: GatewayEvent) -> UserStatus {
        match event {
            GatewayEvent::UserStatus(status) => status,
            other => panic!("expected user-status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn online_then_offline_broadcasts_in_order_and_clears_key() {
        let (tracker, dispatcher, user_id) = tracker_with_user();
        let mut rx = dispatcher.subscribe();

        tracker.set_online(user_id);
        assert!(tracker.is_online(user_id));
        tracker.set_offline(user_id).unwrap();
        assert!(!tracker.is_online(user_id));
        assert!(tracker.inner.cache.get(&status_key(user_id)).is_none());

        let first = expect_status(rx.recv().await.unwrap());
        assert_eq!(first.user_id, user_id);
        assert!(first.is_online);
        assert_eq!(first.last_seen, None);

        let second = expect_status(rx.recv().await.unwrap());
        assert!(!second.is_online);
        assert!(second.last_seen.is_some());

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_persists_last_seen() {
        let (tracker, _, user_id) = tracker_with_user();

        let status = tracker.set_offline(user_id).unwrap();
        let stored = tracker.status(user_id).unwrap();

        assert!(!stored.is_online);
        assert_eq!(stored.last_seen, status.last_seen);
    }

    #[tokio::test(start_paused = true)]
    async fn marker_lapses_silently_after_ttl() {
        let (tracker, dispatcher, user_id) = tracker_with_user();
        tracker.set_online(user_id);
        let mut rx = dispatcher.subscribe();

        tokio::time::advance(PRESENCE_TTL + Duration::from_secs(1)).await;

        assert!(!tracker.is_online(user_id));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn renewing_keeps_user_online() {
        let (tracker, _, user_id) = tracker_with_user();
        tracker.set_online(user_id);
        tokio::time::advance(Duration::from_secs(40)).await;
        tracker.set_online(user_id);
        tokio::time::advance(Duration::from_secs(40)).await;

        assert!(tracker.status(user_id).unwrap().is_online);
    }

    #[tokio::test]
    async fn offline_for_unknown_user_does_not_broadcast() {
        let (tracker, dispatcher, _) = tracker_with_user();
        let mut rx = dispatcher.subscribe();

        assert!(tracker.set_offline(Uuid::new_v4()).is_err());
        assert!(rx.try_recv().is_err());
    }
}
