//! Directory-backed cache storage.
//!
//! Each entry lives in `<dir>/<key>.json` together with its own creation
//! timestamp and lifetime, so expiry survives restarts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{CacheEntry, CacheError, CacheResult, CacheStorage};

const EXTENSION: &str = "json";

/// On-disk layout of one entry. The key is the file name.
#[derive(Serialize, Deserialize)]
struct FileEntry {
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
    value: Vec<u8>,
}

/// One-file-per-key cache storage.
///
/// Clones share one mutation lock, so writes and expiry removals through
/// the same storage never interleave.
#[derive(Debug, Clone)]
pub struct FileCacheStorage {
    dir: PathBuf,
    mutation: Arc<Mutex<()>>,
}

impl FileCacheStorage {
    /// Use `dir`, which is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            mutation: Arc::new(Mutex::new(())),
        }
    }

    /// `<platform cache dir>/qhub`, falling back to the temp dir.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("qhub")
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> CacheResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }
}

async fn read_file(path: &Path) -> CacheResult<Option<FileEntry>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

async fn remove_file(path: &Path) -> CacheResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl Default for FileCacheStorage {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

#[async_trait]
impl CacheStorage for FileCacheStorage {
    async fn read(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let path = self.path_for(key)?;
        Ok(read_file(&path).await?.map(|stored| CacheEntry {
            key: key.to_string(),
            value: stored.value,
            created_at: stored.created_at,
            ttl_seconds: stored.ttl_seconds,
        }))
    }

    async fn write(&self, entry: CacheEntry) -> CacheResult<()> {
        let path = self.path_for(&entry.key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec(&FileEntry {
            created_at: entry.created_at,
            ttl_seconds: entry.ttl_seconds,
            value: entry.value,
        })?;
        let _guard = self.mutation.lock().await;
        // Write then rename so readers never see a partial file.
        let tmp = path.with_extension(format!("{EXTENSION}.tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let path = self.path_for(key)?;
        let _guard = self.mutation.lock().await;
        remove_file(&path).await
    }

    async fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> CacheResult<bool> {
        let path = self.path_for(key)?;
        let _guard = self.mutation.lock().await;
        // Re-read under the lock; the caller's copy may be stale.
        let expired = self
            .read(key)
            .await?
            .is_some_and(|entry| entry.is_expired(now));
        if expired {
            remove_file(&path).await?;
        }
        Ok(expired)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
