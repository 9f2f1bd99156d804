// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tar-streaming volume contents in and out.
//!
//! [`DirStreamer`] works on the volume's host directory: archiving walks
//! the directory on a blocking thread into a byte pipe, and restoring
//! unpacks a tar stream the same way. Volumes without a host path (PVCs)
//! cannot be streamed and surface [`CacheError::NoHostPath`], which the
//! cache wrapper treats as "nothing to do".

use crate::{CacheError, CacheReader, PipedStage};
use async_trait::async_trait;
use kiln_driver::Volume;
use std::path::PathBuf;
use tokio_util::io::SyncIoBridge;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Moves a volume's bytes as a tar stream.
#[async_trait]
pub trait VolumeStreamer: Send + Sync {
    /// Archive the volume's contents. Drain the stage reader, then join its
    /// task.
    async fn copy_from_volume(&self, volume: &dyn Volume) -> Result<PipedStage, CacheError>;

    /// Unpack a tar stream into the volume, consuming `reader` fully.
    async fn copy_to_volume(
        &self,
        volume: &dyn Volume,
        reader: CacheReader,
    ) -> Result<(), CacheError>;
}

/// Streamer over host-directory volumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirStreamer;

impl DirStreamer {
    fn dir_of(volume: &dyn Volume) -> Result<PathBuf, CacheError> {
        volume.path().ok_or_else(|| CacheError::NoHostPath(volume.name().to_string()))
    }
}

#[async_trait]
impl VolumeStreamer for DirStreamer {
    async fn copy_from_volume(&self, volume: &dyn Volume) -> Result<PipedStage, CacheError> {
        let dir = Self::dir_of(volume)?;
        let (rx, tx) = tokio::io::duplex(PIPE_CAPACITY);
        let task = tokio::task::spawn_blocking(move || {
            let bridge = SyncIoBridge::new(tx);
            let mut builder = tar::Builder::new(bridge);
            builder.follow_symlinks(false);
            builder
                .append_dir_all(".", &dir)
                .map_err(|e| CacheError::Archive(format!("tar of {} failed: {}", dir.display(), e)))?;
            builder
                .into_inner()
                .map_err(|e| CacheError::Archive(format!("tar finish failed: {}", e)))?;
            Ok(())
        });
        Ok(PipedStage { reader: Box::new(rx), task })
    }

    async fn copy_to_volume(
        &self,
        volume: &dyn Volume,
        reader: CacheReader,
    ) -> Result<(), CacheError> {
        let dir = Self::dir_of(volume)?;
        tokio::fs::create_dir_all(&dir).await?;
        tokio::task::spawn_blocking(move || {
            let bridge = SyncIoBridge::new(reader);
            let mut archive = tar::Archive::new(bridge);
            archive
                .unpack(&dir)
                .map_err(|e| CacheError::Archive(format!("untar into {} failed: {}", dir.display(), e)))
        })
        .await??;
        Ok(())
    }
}

#[cfg(test)]
#[path = "streamer_tests.rs"]
mod tests;
