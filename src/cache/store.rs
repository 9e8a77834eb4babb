//! Filesystem-backed cache store
//!
//! Entries live under a root directory, one file per key, and persist
//! across pipeline runs. Writes go through a temp file and an atomic
//! rename, so a concurrent `put` race on the same key is last-writer-wins
//! rather than corruption. Locking is per key; independent keys never
//! contend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A cache entry returned by [`CacheStore::restore`]
#[derive(Debug, Clone)]
pub struct RestoredEntry {
    /// The key that actually matched (exact key or a prefix hit)
    pub key: String,

    /// The stored payload
    pub payload: Vec<u8>,

    /// Whether the exact key matched (false for restore-key hits)
    pub exact: bool,
}

/// Content-addressed key/value store for dependency caches
pub struct CacheStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CacheStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Per-key lock; a put and a get on the same key serialize, puts on
    /// different keys run concurrently.
    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }

    /// Store a payload under a key (last writer wins)
    pub async fn put(&self, key: &str, payload: &[u8]) -> Result<(), CacheError> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let tmp = self.root.join(format!(".tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, self.key_path(key)).await?;

        debug!(key, bytes = payload.len(), "Cache entry written");
        Ok(())
    }

    /// Fetch the payload for an exact key, or None on miss
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        match tokio::fs::read(self.key_path(key)).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch by exact key, falling back to each restore-key prefix in
    /// order; a prefix hit returns the most recently written match.
    pub async fn restore(
        &self,
        key: &str,
        restore_keys: &[String],
    ) -> Result<Option<RestoredEntry>, CacheError> {
        if let Some(payload) = self.get(key).await? {
            return Ok(Some(RestoredEntry {
                key: key.to_string(),
                payload,
                exact: true,
            }));
        }

        for prefix in restore_keys {
            if let Some(matched) = self.newest_with_prefix(prefix).await? {
                let payload = tokio::fs::read(self.root.join(&matched)).await?;
                debug!(prefix, matched = %matched, "Cache restore-key hit");
                return Ok(Some(RestoredEntry {
                    key: matched,
                    payload,
                    exact: false,
                }));
            }
        }

        debug!(key, "Cache miss");
        Ok(None)
    }

    /// Most recently modified entry whose sanitized name starts with the
    /// sanitized prefix
    async fn newest_with_prefix(&self, prefix: &str) -> Result<Option<String>, CacheError> {
        let sanitized = sanitize_key(prefix);
        let mut newest: Option<(String, std::time::SystemTime)> = None;

        let mut read_dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(".tmp-") || !name.starts_with(&sanitized) {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            match &newest {
                Some((_, best)) if *best >= modified => {}
                _ => newest = Some((name, modified)),
            }
        }

        Ok(newest.map(|(name, _)| name))
    }
}

/// Sanitize a key for use as a filename
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
