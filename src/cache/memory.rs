//! Transient per-process memoization keyed by lookup parameters.

use moka::sync::Cache;
use std::time::Duration;

/// TTL-bounded memo table for one domain.
#[derive(Clone)]
pub struct MemoCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> MemoCache<V> {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries)
                .build(),
        }
    }

    /// Build a key from the lookup parameters, e.g. `key("hist", &[date, dep])`.
    pub fn key(namespace: &str, parts: &[&str]) -> String {
        let mut key = String::from(namespace);
        for part in parts {
            key.push('|');
            key.push_str(part);
        }
        key
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: String, value: V) {
        self.inner.insert(key, value);
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}
