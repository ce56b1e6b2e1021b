//! Short-lived memoization keyed by string.
//!
//! Entries carry their own TTL. Concurrent misses on the same key both run
//! the loader; the last one to finish wins.

use std::future::Future;
use std::time::Duration;

use scc::HashMap;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-memory cache with per-entry expiry.
pub struct TtlCache<V> {
    entries: HashMap<String, Entry<V>>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Live value for `key`, if any. Expired entries are evicted on read.
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let hit = self
            .entries
            .read_async(key, |_, entry| {
                (entry.expires_at > now).then(|| entry.value.clone())
            })
            .await?;

        if hit.is_none() {
            self.evict_stale(key, now).await;
        }
        hit
    }

    /// Drop the entry under `key` only if it had expired by `now`, so a
    /// value stored after the stale read survives.
    async fn evict_stale(&self, key: &str, now: Instant) {
        let _ = self
            .entries
            .remove_if_async(key, |entry| entry.expires_at <= now)
            .await;
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    pub async fn put(&self, key: &str, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        if let Err((key, entry)) = self.entries.insert_async(key.to_string(), entry).await {
            let _ = self
                .entries
                .update_async(&key, move |_, existing| *existing = entry)
                .await;
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let _ = self.entries.remove_async(key).await;
    }

    /// Return the cached value, or run `load` and cache what it produces.
    /// Errors are returned to the caller and never cached.
    pub async fn get_or_try_insert<F, Fut, E>(&self, key: &str, ttl: Duration, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }
        let value = load().await?;
        self.put(key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Infallible variant of [`TtlCache::get_or_try_insert`].
    pub async fn get_or_insert<F, Fut>(&self, key: &str, ttl: Duration, load: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(key).await {
            return value;
        }
        let value = load().await;
        self.put(key, value.clone(), ttl).await;
        value
    }
}

impl<V: Clone + Send + Sync + 'static> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
