//! Time-to-live blob cache for derived images and results.
//!
//! Storage is pluggable through the [`CacheStorage`] trait:
//!
//! - [`MemoryCacheStorage`]: in-process map (lost on restart)
//! - [`FileCacheStorage`]: one JSON file per key in a directory
//!
//! Expiry is evaluated against an injectable [`Clock`], so tests can step
//! time without sleeping.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;

pub mod file;
pub mod memory;

pub use file::FileCacheStorage;
pub use memory::MemoryCacheStorage;

/// Errors raised by cache storage backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// Key cannot be used as a storage name.
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    /// Filesystem failure.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored entry could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// One cached blob with its own timestamp and lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Whether the entry is past its lifetime at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let expires_at = i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl));
        match expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// Trait for cache storage backends.
///
/// Implementations must be thread-safe. Reads and writes of a single key are
/// atomic with respect to each other.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Read an entry. `Ok(None)` when the key is absent.
    async fn read(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Store or overwrite an entry.
    async fn write(&self, entry: CacheEntry) -> CacheResult<()>;

    /// Remove an entry. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Remove the entry only if the one stored now is expired at `now`.
    ///
    /// The check and the removal are one step with respect to `write`, so an
    /// entry written after the caller saw a stale one survives. Returns
    /// whether an entry was removed.
    async fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> CacheResult<bool>;

    /// All keys currently stored.
    async fn keys(&self) -> CacheResult<Vec<String>>;
}

/// Key → blob cache with a uniform time-to-live.
pub struct TtlCache {
    storage: Arc<dyn CacheStorage>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    /// Create a cache over `storage` whose entries live for `ttl`.
    pub fn new(storage: Arc<dyn CacheStorage>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            ttl,
            clock,
        }
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the value for `key` if present and not expired.
    ///
    /// An expired entry is deleted. Storage failures are logged and reported
    /// as a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entry = match self.storage.read(key).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                return None;
            }
        };

        let now = self.clock.now();
        if entry.is_expired(now) {
            debug!(key, "Cache entry expired");
            if let Err(e) = self.storage.remove_if_expired(key, now).await {
                warn!(key, error = %e, "Failed to remove expired cache entry");
            }
            return None;
        }
        Some(entry.value)
    }

    /// Whether `key` holds a live entry.
    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Store `value` under `key`, replacing any previous entry and restarting
    /// its lifetime.
    pub async fn set(&self, key: &str, value: Vec<u8>) -> CacheResult<()> {
        self.storage
            .write(CacheEntry {
                key: key.to_string(),
                value,
                created_at: self.clock.now(),
                ttl_seconds: whole_seconds(self.ttl),
            })
            .await
    }

    /// Remove every expired entry and return how many were removed.
    ///
    /// Entries that cannot be read are logged and skipped.
    pub async fn clear_expired(&self) -> CacheResult<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        for key in self.storage.keys().await? {
            match self.storage.read(&key).await {
                Ok(Some(entry)) if entry.is_expired(now) => {
                    if self.storage.remove_if_expired(&key, now).await? {
                        removed += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable cache entry"),
            }
        }
        if removed > 0 {
            debug!(removed, "Cleared expired cache entries");
        }
        Ok(removed)
    }
}

/// Lifetime in whole seconds, rounded up so a sub-second TTL never becomes 0.
fn whole_seconds(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

/// Run [`TtlCache::clear_expired`] every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    cache: Arc<TtlCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = cache.clear_expired().await {
                        warn!(error = %e, "Cache sweep failed");
                    }
                }
            }
        }
        debug!("Cache sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_clock(ttl_secs: u64) -> (TtlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(
            Arc::new(MemoryCacheStorage::new()),
            Duration::from_secs(ttl_secs),
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let now = Utc::now();
        let entry = CacheEntry {
            key: "k".into(),
            value: vec![],
            created_at: now,
            ttl_seconds: 10,
        };
        assert!(!entry.is_expired(now + chrono::Duration::seconds(9)));
        assert!(entry.is_expired(now + chrono::Duration::seconds(10)));
    }

    #[tokio::test]
    async fn test_get_set() {
        let (cache, _) = cache_with_clock(60);
        assert!(cache.get("missing").await.is_none());
        cache.set("k", b"v1".to_vec()).await.unwrap();
        assert_eq!(cache.get("k").await.as_deref(), Some(&b"v1"[..]));
        cache.set("k", b"v2".to_vec()).await.unwrap();
        assert_eq!(cache.get("k").await.as_deref(), Some(&b"v2"[..]));
    }

    #[tokio::test]
    async fn test_expired_get_deletes() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(storage.clone(), Duration::from_secs(60), clock.clone());

        cache.set("k", b"v".to_vec()).await.unwrap();
        clock.advance(chrono::Duration::seconds(61));
        assert!(cache.get("k").await.is_none());
        assert!(storage.read("k").await.unwrap().is_none());
    }

    /// Writes a fresh entry for the key right after handing out the stale one,
    /// as a concurrent `set` would.
    struct OverwriteAfterRead {
        inner: MemoryCacheStorage,
        fresh: std::sync::Mutex<Option<CacheEntry>>,
    }

    #[async_trait]
    impl CacheStorage for OverwriteAfterRead {
        async fn read(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
            let stale = self.inner.read(key).await?;
            let fresh = self.fresh.lock().unwrap().take();
            if let Some(fresh) = fresh {
                self.inner.write(fresh).await?;
            }
            Ok(stale)
        }

        async fn write(&self, entry: CacheEntry) -> CacheResult<()> {
            self.inner.write(entry).await
        }

        async fn remove(&self, key: &str) -> CacheResult<()> {
            self.inner.remove(key).await
        }

        async fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> CacheResult<bool> {
            self.inner.remove_if_expired(key, now).await
        }

        async fn keys(&self) -> CacheResult<Vec<String>> {
            self.inner.keys().await
        }
    }

    #[tokio::test]
    async fn test_expired_get_keeps_concurrent_write() {
        let clock = Arc::new(ManualClock::default());
        let inner = MemoryCacheStorage::new();
        let storage = Arc::new(OverwriteAfterRead {
            inner: inner.clone(),
            fresh: std::sync::Mutex::new(None),
        });
        let cache = TtlCache::new(storage.clone(), Duration::from_secs(60), clock.clone());

        cache.set("k", b"old".to_vec()).await.unwrap();
        clock.advance(chrono::Duration::seconds(61));
        *storage.fresh.lock().unwrap() = Some(CacheEntry {
            key: "k".into(),
            value: b"new".to_vec(),
            created_at: clock.now(),
            ttl_seconds: 60,
        });

        assert!(cache.get("k").await.is_none());
        let kept = inner.read("k").await.unwrap().unwrap();
        assert_eq!(kept.value, b"new".to_vec());
        assert_eq!(cache.get("k").await, Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_sub_second_ttl_is_not_zero() {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(
            Arc::new(MemoryCacheStorage::new()),
            Duration::from_millis(500),
            clock.clone(),
        );
        cache.set("k", vec![1]).await.unwrap();
        assert_eq!(cache.get("k").await, Some(vec![1]));

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.get("k").await.is_none());
        assert_eq!(whole_seconds(Duration::from_secs(3)), 3);
    }

    #[tokio::test]
    async fn test_overwrite_restarts_lifetime() {
        let (cache, clock) = cache_with_clock(60);
        cache.set("k", b"v".to_vec()).await.unwrap();
        clock.advance(chrono::Duration::seconds(50));
        cache.set("k", b"v".to_vec()).await.unwrap();
        clock.advance(chrono::Duration::seconds(50));
        assert!(cache.contains("k").await);
    }

    #[tokio::test]
    async fn test_clear_expired_counts() {
        let (cache, clock) = cache_with_clock(60);
        cache.set("old1", vec![1]).await.unwrap();
        cache.set("old2", vec![2]).await.unwrap();
        clock.advance(chrono::Duration::seconds(30));
        cache.set("fresh", vec![3]).await.unwrap();
        clock.advance(chrono::Duration::seconds(40));

        assert_eq!(cache.clear_expired().await.unwrap(), 2);
        assert!(cache.contains("fresh").await);
        assert_eq!(cache.clear_expired().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let (cache, clock) = cache_with_clock(60);
        let cache = Arc::new(cache);
        cache.set("k", vec![0]).await.unwrap();
        clock.advance(chrono::Duration::seconds(120));

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(cache.clone(), Duration::from_secs(300), cancel.clone());
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(cache.storage.keys().await.unwrap().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
