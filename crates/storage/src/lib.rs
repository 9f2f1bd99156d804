// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Key→JSON persistence for pipeline state.
//!
//! The [`StateStore`] trait is the only storage seam the runtime knows
//! about: step state, per-task status rows, and anything a pipeline script
//! stashes through its `storage` object all go through it. Two stores ship:
//! a filesystem store for real runs and an in-memory store for tests and
//! throwaway executions.

mod fs;
pub mod keys;
mod memory;

pub use fs::FsStateStore;
pub use memory::MemoryStateStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt value for key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Concurrency-safe key→JSON persistence.
///
/// Keys are `/`-separated paths. `get` of a missing key is `Ok(None)`;
/// `delete` of a missing key is a no-op. `list` returns entries whose key
/// starts with the prefix, in lexicographic key order.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn put(&self, key: &str, value: &Value) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;
}
