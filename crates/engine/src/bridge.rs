// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend implementation handed to the scripting host.
//!
//! Adapts the (plain or resumable) pipeline runner and the state store to
//! the script-facing seam. Errors flatten to strings here; they become
//! thrown script values on the other side.

use crate::resume::ResumableRunner;
use crate::runner::PipelineRunner;
use async_trait::async_trait;
use kiln_core::{RunInput, RunResult, VolumeInput, VolumeResult};
use kiln_script::PipelineBackend;
use kiln_storage::StateStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which runner drives `runtime.run`.
pub enum RunnerKind {
    Plain(PipelineRunner),
    Resumable(ResumableRunner),
}

pub struct EngineBackend {
    runner: RunnerKind,
    store: Arc<dyn StateStore>,
}

impl EngineBackend {
    pub fn new(runner: RunnerKind, store: Arc<dyn StateStore>) -> Self {
        Self { runner, store }
    }

    pub fn runner(&self) -> &RunnerKind {
        &self.runner
    }

    fn plain(&self) -> &PipelineRunner {
        match &self.runner {
            RunnerKind::Plain(runner) => runner,
            RunnerKind::Resumable(resumable) => resumable.inner(),
        }
    }
}

#[async_trait]
impl PipelineBackend for EngineBackend {
    async fn run_task(
        &self,
        ctx: &CancellationToken,
        input: RunInput,
    ) -> Result<RunResult, String> {
        match &self.runner {
            RunnerKind::Plain(runner) => runner
                .run(ctx, input)
                .await
                .map(|report| report.result)
                .map_err(|e| e.to_string()),
            RunnerKind::Resumable(resumable) => {
                resumable.run(ctx, input).await.map_err(|e| e.to_string())
            }
        }
    }

    async fn create_volume(
        &self,
        ctx: &CancellationToken,
        input: VolumeInput,
    ) -> Result<VolumeResult, String> {
        self.plain().create_volume(ctx, input).await.map_err(|e| e.to_string())
    }

    async fn storage_get(&self, key: &str) -> Result<Option<serde_json::Value>, String> {
        self.store.get(key).await.map_err(|e| e.to_string())
    }

    async fn storage_set(&self, key: &str, value: serde_json::Value) -> Result<(), String> {
        self.store.put(key, &value).await.map_err(|e| e.to_string())
    }

    async fn storage_delete(&self, key: &str) -> Result<(), String> {
        self.store.delete(key).await.map_err(|e| e.to_string())
    }

    async fn storage_list(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, String> {
        self.store.list(prefix).await.map_err(|e| e.to_string())
    }
}
