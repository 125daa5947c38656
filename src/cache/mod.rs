//! Cache tiers: a transient memo table per client and the persistent
//! SQLite store for slow-changing lookups.

pub mod memory;
pub mod schema;
pub mod store;

pub use memory::MemoCache;
pub use store::{CacheError, CacheStore, Cached, Created, WriteStamp};

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe handle to the persistent store.
pub type SharedCache = Arc<Mutex<CacheStore>>;

pub fn shared(store: CacheStore) -> SharedCache {
    Arc::new(Mutex::new(store))
}

/// Cache key for a free-text query: SHA-256 of the trimmed, lowercased text.
pub fn query_hash(query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}
