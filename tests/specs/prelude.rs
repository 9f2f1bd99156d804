// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the spec suite.

use kiln_engine::{Executor, ExecutorConfig};
use kiln_storage::MemoryStateStore;
use std::sync::Arc;

/// A sandboxed pipeline environment: native driver rooted in a tempdir,
/// in-memory state store.
pub struct Sandbox {
    pub root: tempfile::TempDir,
    pub store: Arc<MemoryStateStore>,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}")),
            store: Arc::new(MemoryStateStore::new()),
        }
    }

    /// DSN for the native driver rooted in this sandbox.
    pub fn dsn(&self) -> String {
        format!("native:root={}", self.root.path().join("driver").display())
    }

    pub fn config(&self, run_id: &str) -> ExecutorConfig {
        ExecutorConfig::new(self.dsn())
            .run_id(run_id.to_string())
            .state_store(self.store.clone())
    }

    /// Run a script to completion, panicking on failure.
    pub async fn run(&self, run_id: &str, source: &str) -> serde_json::Value {
        Executor::new()
            .run(self.config(run_id), source)
            .await
            .unwrap_or_else(|e| panic!("pipeline failed: {e}"))
            .value
    }

    /// The persisted status row for one step.
    pub async fn task_row(&self, run_id: &str, step_id: &str) -> serde_json::Value {
        use kiln_storage::StateStore;
        self.store
            .get(&kiln_storage::keys::task_status_key(run_id, step_id))
            .await
            .unwrap_or_else(|e| panic!("store: {e}"))
            .unwrap_or_else(|| panic!("no task row for {step_id}"))
    }
}
