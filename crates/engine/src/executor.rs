// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level glue: DSN → driver → (cached volumes) → runner → script.
//!
//! One `run` is one pipeline execution. The executor owns the root
//! cancellation context; step timeouts derive children from it, and
//! teardown (volume cleanup, then driver close) runs even when the script
//! fails — with the drain of outstanding script workers sequenced before
//! the driver goes away.

use crate::bridge::{EngineBackend, RunnerKind};
use crate::resume::ResumableRunner;
use crate::runner::{OutputCallback, PipelineRunner, RunnerError, VolumeWrapper};
use crate::secrets::SecretsManager;
use kiln_cache::{CachedVolume, Compression, DirStreamer, FsCacheStore};
use kiln_core::RunId;
use kiln_driver::dsn::Dsn;
use kiln_driver::registry::{self, DriverRegistry};
use kiln_driver::DriverError;
use kiln_script::{FetchConfig, Notifier, ScriptError, ScriptHost};
use kiln_storage::{MemoryStateStore, StateStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How long teardown waits for stray script workers after a failure.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
    #[error("cache error: {0}")]
    Cache(#[from] kiln_cache::CacheError),
}

/// Everything a pipeline execution needs.
pub struct ExecutorConfig {
    pub dsn: String,
    /// Reuse an ID to resume; omit for a fresh run.
    pub run_id: Option<String>,
    pub resume: bool,
    pub state_store: Option<Arc<dyn StateStore>>,
    pub secrets: Option<Arc<dyn SecretsManager>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub fetch: Option<FetchConfig>,
    pub output: Option<OutputCallback>,
    /// Whole-pipeline deadline.
    pub timeout: Option<Duration>,
}

impl ExecutorConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            run_id: None,
            resume: false,
            state_store: None,
            secrets: None,
            notifier: None,
            fetch: None,
            output: None,
            timeout: None,
        }
    }

    kiln_core::setters! {
        set {
            resume: bool,
        }
        option {
            run_id: String,
            timeout: Duration,
        }
    }

    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn secrets(mut self, secrets: Arc<dyn SecretsManager>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn output(mut self, callback: OutputCallback) -> Self {
        self.output = Some(callback);
        self
    }
}

/// Outcome of one pipeline execution.
#[derive(Debug)]
pub struct ExecutionReport {
    pub run_id: RunId,
    /// The pipeline function's resolved value, as JSON.
    pub value: serde_json::Value,
}

pub struct Executor {
    registry: Option<Arc<DriverRegistry>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Executor over the process-wide driver registry.
    pub fn new() -> Self {
        Self { registry: None }
    }

    /// Executor over an explicit registry (tests).
    pub fn with_registry(registry: Arc<DriverRegistry>) -> Self {
        Self { registry: Some(registry) }
    }

    /// Run one pipeline script to completion.
    pub async fn run(
        &self,
        config: ExecutorConfig,
        source: &str,
    ) -> Result<ExecutionReport, ExecutorError> {
        let dsn = Dsn::parse(&config.dsn)?;
        let run_id = match &config.run_id {
            Some(id) => RunId::from_string(id.clone()),
            None => RunId::generate(),
        };
        let default_namespace = format!("kiln-{}", run_id.short(8));

        let driver = match &self.registry {
            Some(registry) => registry.build(&dsn, &default_namespace).await?,
            None => registry::global().build(&dsn, &default_namespace).await?,
        };
        tracing::info!(
            run_id = %run_id,
            driver = driver.name(),
            namespace = driver.namespace(),
            resume = config.resume,
            "pipeline starting"
        );

        let store: Arc<dyn StateStore> = match config.state_store.clone() {
            Some(store) => store,
            None => Arc::new(MemoryStateStore::new()),
        };

        // Root context; an overall timeout just cancels it.
        let ctx = CancellationToken::new();
        let _deadline = config.timeout.map(|timeout| {
            let token = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            })
        });

        let mut runner =
            PipelineRunner::new(driver.clone(), run_id.clone()).with_store(store.clone());
        if let Some(secrets) = config.secrets.clone() {
            runner = runner.with_secrets(secrets);
        }
        if let Some(output) = config.output.clone() {
            runner = runner.with_output_callback(output);
        }
        if let Some(wrapper) = volume_wrapper(&dsn, &ctx)? {
            runner = runner.with_volume_wrapper(wrapper);
        }

        let kind = if config.resume {
            RunnerKind::Resumable(
                ResumableRunner::load(runner, store.clone(), true).await?,
            )
        } else {
            RunnerKind::Plain(runner)
        };

        let backend = Arc::new(EngineBackend::new(kind, store));
        let mut host = ScriptHost::new(backend.clone(), ctx.clone());
        if let Some(fetch) = config.fetch.clone() {
            host = host.with_fetch_config(fetch);
        }
        if let Some(notifier) = config.notifier.clone() {
            host = host.with_notifier(notifier);
        }

        let outcome = host.run_pipeline(source).await;

        // Teardown. On failure paths some workers may still be in flight;
        // give them a bounded grace before the driver disappears.
        if outcome.is_err() {
            let _ = tokio::time::timeout(DRAIN_GRACE, host.pending().drained()).await;
        }
        if let RunnerKind::Resumable(resumable) = backend.runner() {
            if let Err(e) = resumable.complete().await {
                tracing::warn!(run_id = %run_id, error = %e, "failed to finalize resume state");
            }
        }
        let teardown_ctx = CancellationToken::new();
        let plain = match backend.runner() {
            RunnerKind::Plain(runner) => runner,
            RunnerKind::Resumable(resumable) => resumable.inner(),
        };
        if let Err(e) = plain.cleanup_volumes(&teardown_ctx).await {
            tracing::warn!(run_id = %run_id, error = %e, "volume cleanup reported failures");
        }
        if let Err(e) = driver.close(&teardown_ctx).await {
            tracing::warn!(run_id = %run_id, error = %e, "driver close reported failures");
        }

        let value = outcome?;
        tracing::info!(run_id = %run_id, "pipeline finished");
        Ok(ExecutionReport { run_id, value: value.to_json() })
    }
}

/// Build the cache-wrapping volume factory from DSN params, if configured.
fn volume_wrapper(
    dsn: &Dsn,
    ctx: &CancellationToken,
) -> Result<Option<VolumeWrapper>, ExecutorError> {
    let Some(cache_root) = dsn.params.get("cache_store") else {
        return Ok(None);
    };
    let mut store = FsCacheStore::new(cache_root)?;
    if let Some(ttl) = dsn.params.get("cache_ttl").and_then(|v| v.parse().ok()) {
        store = store.with_ttl(Duration::from_secs(ttl));
    }
    let compression =
        Compression::from_name(&dsn.params.get_or("cache_compression", "zstd"))?;
    let prefix = dsn.params.get_or("cache_key_prefix", "");
    let store = Arc::new(store);
    let ctx = ctx.clone();

    let wrapper: VolumeWrapper = Arc::new(move |volume, base_key| {
        let store = store.clone();
        let ctx = ctx.clone();
        let key = format!("{}{}", prefix, base_key);
        Box::pin(async move {
            let cached = Arc::new(CachedVolume::new(
                volume,
                Arc::new(DirStreamer),
                store,
                compression,
                &key,
            ));
            // Restore before the volume is first used by a step.
            cached.restore_from_cache(&ctx).await;
            cached as Arc<dyn kiln_driver::Volume>
        })
    });
    Ok(Some(wrapper))
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
