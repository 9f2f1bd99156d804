// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! What the scripting host needs from the engine.
//!
//! The host never talks to drivers or stores directly; it hands run and
//! volume requests (plus storage traffic) across this seam. Errors are
//! plain strings — they become thrown script values on the other side.

use async_trait::async_trait;
use kiln_core::{RunInput, RunResult, VolumeInput, VolumeResult};
use tokio_util::sync::CancellationToken;

/// The engine-side counterpart of the `runtime` and `storage` objects.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    async fn run_task(
        &self,
        ctx: &CancellationToken,
        input: RunInput,
    ) -> Result<RunResult, String>;

    async fn create_volume(
        &self,
        ctx: &CancellationToken,
        input: VolumeInput,
    ) -> Result<VolumeResult, String>;

    async fn storage_get(&self, key: &str) -> Result<Option<serde_json::Value>, String>;
    async fn storage_set(&self, key: &str, value: serde_json::Value) -> Result<(), String>;
    async fn storage_delete(&self, key: &str) -> Result<(), String>;
    async fn storage_list(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, String>;
}

/// Delivers rendered notifications. The third-party glue lives outside
/// this crate; the default implementation just logs.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str, config: &serde_json::Value) -> Result<(), String>;
}

/// Notifier that writes through tracing.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, message: &str, config: &serde_json::Value) -> Result<(), String> {
        tracing::info!(%message, config = %config, "notification");
        Ok(())
    }
}
