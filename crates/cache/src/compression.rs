// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable stream compression for cache entries.
//!
//! The codec runs synchronously on a blocking thread, bridged to the async
//! pipes with [`SyncIoBridge`]. The extension feeds into the cache key so
//! entries written with one codec are never read back with another.

use crate::{CacheError, CacheReader, PipedStage};
use tokio_util::io::SyncIoBridge;

const PIPE_CAPACITY: usize = 64 * 1024;
const ZSTD_LEVEL: i32 = 3;

/// Cache entry compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Zstd,
}

impl Compression {
    /// Parse a `cache_compression` param value.
    pub fn from_name(name: &str) -> Result<Self, CacheError> {
        match name {
            "" | "none" => Ok(Self::None),
            "zstd" => Ok(Self::Zstd),
            other => Err(CacheError::UnknownCompression(other.to_string())),
        }
    }

    /// Key suffix preventing cross-format aliasing.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Zstd => ".zst",
        }
    }

    /// Wrap `input` so the returned reader yields compressed bytes.
    pub fn compress(&self, input: CacheReader) -> PipedStage {
        match self {
            Self::None => passthrough(input),
            Self::Zstd => {
                let (rx, tx) = tokio::io::duplex(PIPE_CAPACITY);
                let task = tokio::task::spawn_blocking(move || {
                    let mut src = SyncIoBridge::new(input);
                    let dst = SyncIoBridge::new(tx);
                    let mut encoder = zstd::stream::Encoder::new(dst, ZSTD_LEVEL)
                        .map_err(CacheError::Io)?;
                    std::io::copy(&mut src, &mut encoder).map_err(CacheError::Io)?;
                    encoder.finish().map_err(CacheError::Io)?;
                    Ok(())
                });
                PipedStage { reader: Box::new(rx), task }
            }
        }
    }

    /// Wrap `input` so the returned reader yields decompressed bytes.
    pub fn decompress(&self, input: CacheReader) -> PipedStage {
        match self {
            Self::None => passthrough(input),
            Self::Zstd => {
                let (rx, tx) = tokio::io::duplex(PIPE_CAPACITY);
                let task = tokio::task::spawn_blocking(move || {
                    let src = SyncIoBridge::new(input);
                    let mut dst = SyncIoBridge::new(tx);
                    let mut decoder =
                        zstd::stream::Decoder::new(src).map_err(CacheError::Io)?;
                    std::io::copy(&mut decoder, &mut dst).map_err(CacheError::Io)?;
                    Ok(())
                });
                PipedStage { reader: Box::new(rx), task }
            }
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Zstd => "zstd",
        })
    }
}

/// No-op stage: the reader is the input, the task is already done.
fn passthrough(input: CacheReader) -> PipedStage {
    PipedStage { reader: input, task: tokio::spawn(async { Ok(()) }) }
}

#[cfg(test)]
#[path = "compression_tests.rs"]
mod tests;
