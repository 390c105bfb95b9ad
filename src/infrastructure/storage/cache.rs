// In-memory result cache with TTL, backed by DashMap
use crate::domain::model::{CacheEntry, ClassificationResult};
use crate::domain::traits::Clock;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Thread-safe per-URL result cache.
///
/// Entries older than the TTL count as absent. They are dropped when looked
/// up, or by [`ResultCache::purge_expired`]. Writers are last-write-wins.
pub struct ResultCache {
    map: DashMap<String, CacheEntry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn lookup(&self, url: &str) -> Option<ClassificationResult> {
        let now = self.clock.now();
        // remove_if keeps the expiry check and the eviction atomic per shard
        let expired = self
            .map
            .remove_if(url, |_, entry| now.duration_since(entry.created_at) >= self.ttl);
        if expired.is_some() {
            debug!("Cache entry expired for {}", url);
            return None;
        }
        self.map.get(url).map(|entry| entry.value().result.clone())
    }

    pub fn store(&self, url: &str, result: ClassificationResult) {
        self.map.insert(
            url.to_string(),
            CacheEntry {
                result,
                created_at: self.clock.now(),
            },
        );
    }

    /// True when a fresh entry exists, without cloning it.
    pub fn contains(&self, url: &str) -> bool {
        let now = self.clock.now();
        self.map
            .get(url)
            .is_some_and(|entry| now.duration_since(entry.created_at) < self.ttl)
    }

    pub fn invalidate(&self, url: &str) -> bool {
        self.map.remove(url).is_some()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.map.len();
        self.map
            .retain(|_, entry| now.duration_since(entry.created_at) < self.ttl);
        before.saturating_sub(self.map.len())
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Periodically purge expired entries until the cache itself is dropped.
pub fn spawn_sweeper(cache: &Arc<ResultCache>, every: Duration) -> tokio::task::JoinHandle<()> {
    let weak = Arc::downgrade(cache);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(cache) = weak.upgrade() else { break };
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!("Swept {} expired cache entries", removed);
            }
        }
    })
}
