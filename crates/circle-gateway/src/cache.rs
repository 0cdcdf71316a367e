use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// String key-value store where every entry carries an expiry.
///
/// Expired entries are dropped lazily when read; nothing runs in the
/// background and expiry produces no event.
#[derive(Default)]
pub struct TtlCache {
    entries: DashMap<String, Entry>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous entry and its expiry.
    pub fn set_ex(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    /// Remove `key`. Returns true if a live entry was removed.
    pub fn del(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.expires_at > now)
    }
}
