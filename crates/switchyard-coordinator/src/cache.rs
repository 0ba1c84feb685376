use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-memory TTL cache for utility responses.
pub struct ResponseCache {
    ttl: Duration,
    entries: parking_lot::Mutex<HashMap<String, Entry>>,
}

impl ResponseCache {
    /// Empty cache whose entries live for `ttl` unless set otherwise.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Cache key for a request: SHA-256 over method, url and params.
    ///
    /// Params are hashed in sorted key order.
    pub fn key(method: &str, url: &str, params: &Map<String, Value>) -> String {
        let sorted: BTreeMap<&String, &Value> = params.iter().collect();
        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        hasher.update(serde_json::to_string(&sorted).unwrap_or_default().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Fresh value for `key`; expired entries read as missing.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Store with an explicit TTL, replacing any previous value.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        self.entries.lock().insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove `key`; true if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Entries held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_key_is_stable_and_discriminating() {
        let a = ResponseCache::key("GET", "https://x/api", &params(json!({"a": 1, "b": 2})));
        let b = ResponseCache::key("GET", "https://x/api", &params(json!({"b": 2, "a": 1})));
        let c = ResponseCache::key("POST", "https://x/api", &params(json!({"a": 1, "b": 2})));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        cache.set("k", json!({"temp": 21}));
        assert_eq!(cache.get("k"), Some(json!({"temp": 21})));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("k").is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_purge() {
        let cache = ResponseCache::new(Duration::from_secs(10));
        cache.set("short", json!(1));
        cache.set_with_ttl("long", json!(2), Duration::from_secs(60));
        assert!(cache.delete("short"));
        assert!(!cache.delete("short"));

        cache.set("short", json!(1));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
