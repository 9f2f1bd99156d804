// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Volume cache layer.
//!
//! [`CachedVolume`] wraps a driver volume so its contents are restored from
//! a content-addressed cache store before a step runs and persisted back
//! (compressed, streamed) when the volume is cleaned up. Everything moves
//! through byte pipes — tar and the codecs run on blocking threads, the
//! store reads an async stream, and no stage buffers a whole archive.

mod compression;
mod store;
mod streamer;
mod volume;

pub use compression::Compression;
pub use store::{CacheStore, FsCacheStore};
pub use streamer::{DirStreamer, VolumeStreamer};
pub use volume::{cache_key, CachedVolume};

use thiserror::Error;

/// Byte stream handed between cache stages.
pub type CacheReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// A pipeline stage that produces bytes on `reader` while `task` drives the
/// producing side. Join the task after draining the reader — both sides
/// must finish before an operation reports success.
pub struct PipedStage {
    pub reader: CacheReader,
    pub task: tokio::task::JoinHandle<Result<(), CacheError>>,
}

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("unknown compression {0:?}")]
    UnknownCompression(String),
    #[error("volume {0:?} has no host path to stream")]
    NoHostPath(String),
    #[error("cache worker panicked: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
