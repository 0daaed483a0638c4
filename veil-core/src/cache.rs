//! Key-value cache collaborator.
//!
//! [`CacheStore`] is the seam to whatever shared store backs the gateway.
//! Values are opaque bytes with a TTL; counters are separate atomic
//! integers. [`MemoryCache`] is the in-process implementation, with a
//! background sweeper for expired entries.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Add `by` to a counter, creating it at zero; returns the new value.
    async fn incr(&self, key: &str, by: i64) -> Result<i64, CacheError>;

    async fn decr(&self, key: &str, by: i64) -> Result<i64, CacheError>;

    /// Current value of a counter; zero when it was never touched.
    async fn counter(&self, key: &str) -> Result<i64, CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    bytes: Arc<[u8]>,
    expires_at: Instant,
}

/// In-process cache. Clones share storage.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    counters: Arc<DashMap<String, i64>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `every` until `cancel` fires.
    pub fn spawn_sweeper(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = cache.len(), "cache.sweep");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.bytes.to_vec());
        if hit.is_none() {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            self.entries.remove(key);
            return Ok(());
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                bytes: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let mut slot = self.counters.entry(key.to_string()).or_insert(0);
        *slot = slot.saturating_add(by);
        Ok(*slot)
    }

    async fn decr(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        self.incr(key, by.saturating_neg()).await
    }

    async fn counter(&self, key: &str) -> Result<i64, CacheError> {
        Ok(self.counters.get(key).map(|v| *v).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn counters_move_both_ways() {
        let cache = MemoryCache::new();
        assert_eq!(cache.counter("c").await.unwrap(), 0);
        assert_eq!(cache.incr("c", 3).await.unwrap(), 3);
        assert_eq!(cache.decr("c", 1).await.unwrap(), 2);
        assert_eq!(cache.counter("c").await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_entries() {
        let cache = MemoryCache::new();
        cache
            .set("a", b"1".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set("b", b"2".to_vec(), Duration::from_secs(120))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_secs(5), cancel.clone());
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(cache.len(), 1);
        cancel.cancel();
        handle.await.unwrap();
    }
}
