// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cached volume wrapper.
//!
//! Restore happens at most once per wrapper (before the step touches the
//! volume); persist happens on cleanup, before the underlying volume goes
//! away. Cache problems never fail the pipeline: a miss-like restore error
//! is ignored and a persist failure is logged without blocking cleanup.

use crate::{CacheError, CacheStore, Compression, VolumeStreamer};
use async_trait::async_trait;
use kiln_driver::{DriverError, Volume};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Deterministic cache key for a volume use site.
///
/// `sha256(namespace ‖ run_id ‖ step_id ‖ task_name)`, truncated to 16 hex
/// characters — stable within a run so reruns collide and stay idempotent
/// at the backend.
pub fn cache_key(namespace: &str, run_id: &str, step_id: &str, task_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(run_id.as_bytes());
    hasher.update(step_id.as_bytes());
    hasher.update(task_name.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// A driver volume with transparent cache restore/persist.
pub struct CachedVolume {
    inner: Arc<dyn Volume>,
    streamer: Arc<dyn VolumeStreamer>,
    store: Arc<dyn CacheStore>,
    compression: Compression,
    /// Full store key: caller key plus the compression extension.
    key: String,
    restored: AtomicBool,
}

impl CachedVolume {
    pub fn new(
        inner: Arc<dyn Volume>,
        streamer: Arc<dyn VolumeStreamer>,
        store: Arc<dyn CacheStore>,
        compression: Compression,
        base_key: &str,
    ) -> Self {
        Self {
            inner,
            streamer,
            store,
            compression,
            key: format!("{}{}", base_key, compression.extension()),
            restored: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Restore volume contents from the cache. Single-shot: the second and
    /// later calls are no-ops. A miss, or a read error that resembles one,
    /// is silently non-fatal.
    pub async fn restore_from_cache(&self, _ctx: &CancellationToken) {
        if self.restored.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.try_restore().await {
            Ok(true) => {
                tracing::info!(volume = %self.inner.name(), key = %self.key, "volume restored from cache");
            }
            Ok(false) => {
                tracing::debug!(volume = %self.inner.name(), key = %self.key, "cache miss");
            }
            Err(e) => {
                tracing::debug!(
                    volume = %self.inner.name(),
                    key = %self.key,
                    error = %e,
                    "cache restore failed, treating as miss"
                );
            }
        }
    }

    async fn try_restore(&self) -> Result<bool, CacheError> {
        if !self.store.exists(&self.key).await? {
            return Ok(false);
        }
        let Some(reader) = self.store.restore(&self.key).await? else {
            return Ok(false);
        };
        let stage = self.compression.decompress(reader);
        self.streamer.copy_to_volume(self.inner.as_ref(), stage.reader).await?;
        stage.task.await??;
        Ok(true)
    }

    /// Persist volume contents to the cache: tar → compressor → store,
    /// all streaming. Every stage must finish before this returns.
    pub async fn persist_to_cache(&self, _ctx: &CancellationToken) -> Result<(), CacheError> {
        let archive = self.streamer.copy_from_volume(self.inner.as_ref()).await?;
        let compressed = self.compression.compress(archive.reader);
        self.store.persist(&self.key, compressed.reader).await?;
        compressed.task.await??;
        archive.task.await??;
        tracing::info!(volume = %self.inner.name(), key = %self.key, "volume persisted to cache");
        Ok(())
    }
}

#[async_trait]
impl Volume for CachedVolume {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn path(&self) -> Option<PathBuf> {
        self.inner.path()
    }

    /// Persist first, then delegate. Persist errors never block the
    /// underlying cleanup.
    async fn cleanup(&self, ctx: &CancellationToken) -> Result<(), DriverError> {
        if let Err(e) = self.persist_to_cache(ctx).await {
            tracing::warn!(volume = %self.inner.name(), error = %e, "cache persist failed");
        }
        self.inner.cleanup(ctx).await
    }
}

#[cfg(test)]
#[path = "volume_tests.rs"]
mod tests;
