//! DashMap-backed implementation of [`SharedCache`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::AuthResult;
use crate::storage::SharedCache;

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
struct CachedEntry {
    value: String,
    count: i64,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            count: 0,
            cached_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Local cache on a sharded concurrent map.
///
/// Increments run under the shard lock of their key, so
/// [`increment_and_maybe_expire`](SharedCache::increment_and_maybe_expire)
/// is atomic per key. Expired entries are dropped lazily on access or by
/// [`purge_expired`](Self::purge_expired).
#[derive(Clone, Default)]
pub struct LocalCache {
    entries: Arc<DashMap<String, CachedEntry>>,
}

impl LocalCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the stored value at `key` if unexpired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl SharedCache for LocalCache {
    async fn increment_and_maybe_expire(&self, key: &str, ttl: Duration) -> AuthResult<i64> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CachedEntry::new(String::new(), ttl));

        // A lapsed window starts over.
        if entry.is_expired() {
            *entry = CachedEntry::new(String::new(), ttl);
        }

        let count = entry.count + 1;
        entry.count = count;
        entry.value = count.to_string();
        Ok(count)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()> {
        self.entries
            .insert(key.to_string(), CachedEntry::new(value.to_string(), ttl));
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set (local)");
        Ok(())
    }

    async fn exists(&self, key: &str) -> AuthResult<bool> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(false),
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
            return Ok(false);
        }
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
