// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache stores — where persisted volume archives live.
//!
//! The contract is deliberately forgiving: `restore` of an absent key is
//! `Ok(None)`, never an error, and a TTL-aware store treats an entry older
//! than its ttl as absent. `persist` streams; implementations must not
//! buffer the whole archive in memory.

use crate::{CacheError, CacheReader};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Keyed blob store for cache entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Open a stream over the entry. `None` means miss.
    async fn restore(&self, key: &str) -> Result<Option<CacheReader>, CacheError>;

    /// Stream an entry in. Replaces any existing entry atomically.
    async fn persist(&self, key: &str, reader: CacheReader) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Filesystem cache store, one file per key, optional TTL.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
    ttl: Option<Duration>,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, ttl: None })
    }

    /// Treat entries older than `ttl` as absent.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn file_for(&self, key: &str) -> PathBuf {
        // Keys are hex digests plus a short prefix and extension; flatten
        // anything surprising rather than trusting it as a path.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.root.join(safe)
    }

    /// Entry freshness: `now − mtime > ttl` means expired.
    async fn is_fresh(&self, path: &PathBuf) -> Result<bool, CacheError> {
        let Some(ttl) = self.ttl else { return Ok(true) };
        let meta = tokio::fs::metadata(path).await?;
        let modified = meta.modified()?;
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        Ok(age <= ttl)
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.file_for(key);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }
        self.is_fresh(&path).await
    }

    async fn restore(&self, key: &str) -> Result<Option<CacheReader>, CacheError> {
        let path = self.file_for(key);
        match tokio::fs::File::open(&path).await {
            Ok(file) => {
                if !self.is_fresh(&path).await? {
                    return Ok(None);
                }
                Ok(Some(Box::new(file)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, key: &str, mut reader: CacheReader) -> Result<(), CacheError> {
        let path = self.file_for(key);
        let tmp = path.with_extension("part");
        let mut file = tokio::fs::File::create(&tmp).await?;
        tokio::io::copy(&mut reader, &mut file).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(key, path = %path.display(), "cache entry persisted");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.file_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
