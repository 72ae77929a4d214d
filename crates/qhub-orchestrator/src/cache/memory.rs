//! In-memory cache storage (no persistence).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use super::{CacheEntry, CacheResult, CacheStorage};

/// In-memory cache storage.
#[derive(Clone, Default)]
pub struct MemoryCacheStorage {
    entries: Arc<RwLock<FxHashMap<String, CacheEntry>>>,
}

impl MemoryCacheStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn read(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn write(&self, entry: CacheEntry) -> CacheResult<()> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> CacheResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryCacheStorage::new();
        let entry = CacheEntry {
            key: "a".into(),
            value: vec![1, 2, 3],
            created_at: Utc::now(),
            ttl_seconds: 5,
        };
        storage.write(entry.clone()).await.unwrap();
        assert_eq!(storage.read("a").await.unwrap(), Some(entry));
        assert_eq!(storage.keys().await.unwrap(), vec!["a".to_string()]);

        storage.remove("a").await.unwrap();
        storage.remove("a").await.unwrap();
        assert!(storage.read("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_if_expired_checks_current_entry() {
        let storage = MemoryCacheStorage::new();
        let created = Utc::now();
        storage
            .write(CacheEntry {
                key: "a".into(),
                value: vec![1],
                created_at: created,
                ttl_seconds: 10,
            })
            .await
            .unwrap();

        let later = created + chrono::Duration::seconds(5);
        assert!(!storage.remove_if_expired("a", later).await.unwrap());
        assert!(storage.read("a").await.unwrap().is_some());

        let expired = created + chrono::Duration::seconds(10);
        assert!(storage.remove_if_expired("a", expired).await.unwrap());
        assert!(!storage.remove_if_expired("a", expired).await.unwrap());
    }
}
