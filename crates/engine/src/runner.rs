// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pipeline runner — one instance per pipeline run.
//!
//! Turns script-level run requests into driver calls: derives step and
//! task identity, resolves secrets, writes task status rows, streams
//! output to the attached callback, polls the container to completion,
//! redacts secrets, and schedules cleanup. Cancellation and per-step
//! timeouts surface as `RunStatus::Abort` results, never as errors.

use crate::redact::redact;
use crate::secrets::{SecretScope, SecretsManager};
use kiln_core::{
    format_elapsed, parse_duration, Clock, Mount, RunId, RunInput, RunResult, RunStatus,
    SystemClock, TaskRecord, TaskSpec, TaskState, VolumeInput, VolumeResult,
};
use kiln_driver::{Container, Driver, DriverError, Volume};
use kiln_storage::{keys, StateStore, StoreError};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STREAM_CHUNK: usize = 4096;
const PIPE_CAPACITY: usize = 64 * 1024;

/// Errors from runner operations. Cancellation is not among them — it
/// becomes an aborted [`RunResult`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("missing secret {name:?} for step {step_id}")]
    MissingSecret { name: String, step_id: String },
    #[error("secret backend error: {0}")]
    Secrets(#[from] crate::secrets::SecretError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("volume cleanup failed: {0}")]
    Cleanup(String),
}

/// Which output stream a callback chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives raw output chunks as they stream from the container.
pub type OutputCallback = Arc<dyn Fn(OutputStream, &[u8]) + Send + Sync>;

/// Wraps a freshly created driver volume (cache layer hook). Receives the
/// volume and its deterministic cache base key.
pub type VolumeWrapper = Arc<
    dyn Fn(
            Arc<dyn Volume>,
            String,
        ) -> Pin<Box<dyn Future<Output = Arc<dyn Volume>> + Send>>
        + Send
        + Sync,
>;

/// Everything `run` produces, beyond the script-facing result.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: RunResult,
    pub step_id: String,
    pub task_id: String,
    pub container_id: String,
}

/// A step that has a running container; `finish_step` drives it home.
pub struct StartedStep {
    pub step_id: String,
    pub task_id: String,
    pub name: String,
    pub container: Arc<dyn Container>,
    started_at_ms: u64,
    started: Instant,
    ctx: CancellationToken,
    _timeout_guard: Option<tokio::task::JoinHandle<()>>,
}

/// Outcome of starting a step: running, or aborted before launch.
pub enum StartOutcome {
    Started(Box<StartedStep>),
    Aborted { step_id: String },
}

/// One-pipeline-run coordinator.
pub struct PipelineRunner<C: Clock = SystemClock> {
    driver: Arc<dyn Driver>,
    store: Option<Arc<dyn StateStore>>,
    namespace: String,
    run_id: RunId,
    clock: C,
    call_index: Mutex<u64>,
    volumes: Mutex<Vec<Arc<dyn Volume>>>,
    preseeded: Mutex<HashMap<String, Arc<dyn Volume>>>,
    secrets: Option<Arc<dyn SecretsManager>>,
    /// Values loaded so far; the redaction table.
    secret_values: Mutex<Vec<String>>,
    output: Option<OutputCallback>,
    volume_wrapper: Option<VolumeWrapper>,
}

impl PipelineRunner<SystemClock> {
    pub fn new(driver: Arc<dyn Driver>, run_id: RunId) -> Self {
        Self::with_clock(driver, run_id, SystemClock)
    }
}

impl<C: Clock> PipelineRunner<C> {
    pub fn with_clock(driver: Arc<dyn Driver>, run_id: RunId, clock: C) -> Self {
        let namespace = driver.namespace().to_string();
        Self {
            driver,
            store: None,
            namespace,
            run_id,
            clock,
            call_index: Mutex::new(0),
            volumes: Mutex::new(Vec::new()),
            preseeded: Mutex::new(HashMap::new()),
            secrets: None,
            secret_values: Mutex::new(Vec::new()),
            output: None,
            volume_wrapper: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretsManager>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_output_callback(mut self, callback: OutputCallback) -> Self {
        self.output = Some(callback);
        self
    }

    pub fn with_volume_wrapper(mut self, wrapper: VolumeWrapper) -> Self {
        self.volume_wrapper = Some(wrapper);
        self
    }

    /// Seed a volume under a name; `create_volume` for that name returns it
    /// instead of asking the driver.
    pub fn preseed_volume(&self, name: &str, volume: Arc<dyn Volume>) {
        self.preseeded.lock().insert(name.to_string(), volume);
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Next value the call index will hand out (tests).
    pub fn call_index(&self) -> u64 {
        *self.call_index.lock()
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Drive a reattached container to completion — the non-resuming tail
    /// of the run contract, with identity carried over from prior state.
    pub(crate) async fn resume_step(
        &self,
        ctx: &CancellationToken,
        step_id: &str,
        prior: &kiln_core::StepState,
        container: Arc<dyn Container>,
    ) -> Result<RunReport, RunnerError> {
        let step = StartedStep {
            step_id: step_id.to_string(),
            task_id: prior.task_id.clone(),
            name: prior.name.clone(),
            container,
            started_at_ms: prior.started_at,
            // The original start instant died with the previous process;
            // elapsed restarts from the reattach.
            started: self.clock.now(),
            ctx: ctx.child_token(),
            _timeout_guard: None,
        };
        self.finish_step(step).await
    }

    /// Run one task to completion.
    pub async fn run(
        &self,
        ctx: &CancellationToken,
        input: RunInput,
    ) -> Result<RunReport, RunnerError> {
        let step_id = {
            let mut index = self.call_index.lock();
            let id = format!("{}-{}", *index, input.name);
            *index += 1;
            id
        };
        match self.start_step(ctx, input, &step_id).await? {
            StartOutcome::Started(started) => self.finish_step(*started).await,
            StartOutcome::Aborted { step_id } => Ok(RunReport {
                result: RunResult::aborted(),
                step_id,
                task_id: String::new(),
                container_id: String::new(),
            }),
        }
    }

    /// Steps 1–7 of the run contract: identity, secrets, pending record,
    /// task construction, container launch, running record.
    pub(crate) async fn start_step(
        &self,
        ctx: &CancellationToken,
        input: RunInput,
        step_id: &str,
    ) -> Result<StartOutcome, RunnerError> {
        // Per-step timeout derives a child context; expiry reads exactly
        // like cancellation further down.
        let child = ctx.child_token();
        let timeout_guard = match input.timeout.as_deref() {
            Some(raw) => {
                let timeout =
                    parse_duration(raw).map_err(RunnerError::InvalidInput)?;
                let token = child.clone();
                Some(tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    token.cancel();
                }))
            }
            None => None,
        };

        let task_id = derive_task_id(&self.namespace, self.run_id.as_str(), step_id, &input.name);

        let mut env = input.env.clone();
        for (key, value) in env.iter_mut() {
            let Some(secret_name) = value.strip_prefix("secret:") else { continue };
            let resolved = self.load_secret(secret_name).await?;
            match resolved {
                Some(secret) => {
                    tracing::debug!(step_id, key = %key, "resolved secret env var");
                    *value = secret;
                }
                None => {
                    self.write_record(
                        step_id,
                        &TaskRecord { status: TaskState::Error, ..TaskRecord::pending() },
                    )
                    .await;
                    return Err(RunnerError::MissingSecret {
                        name: secret_name.to_string(),
                        step_id: step_id.to_string(),
                    });
                }
            }
        }

        self.write_record(step_id, &TaskRecord::pending()).await;

        let mut task = TaskSpec::new(&task_id, &input.image, input.command.clone())
            .name(input.name.clone())
            .env(env)
            .privileged(input.privileged);
        task.cwd = input.cwd.clone();
        task.user = input.user;
        task.cpu_shares = input.cpu_shares;
        task.memory_bytes = input.memory_bytes;
        task.mounts = input
            .mounts
            .iter()
            .map(|(volume, path)| Mount::new(volume.clone(), path.clone()))
            .collect();
        // Absent and empty stdin are different things to some backends;
        // only a non-empty script value attaches one.
        if !input.stdin.is_empty() {
            task.stdin = Some(input.stdin.clone().into_bytes());
        }

        let container = match self.driver.run_container(&child, task).await {
            Ok(container) => container,
            Err(e) if e.is_cancelled() || child.is_cancelled() => {
                self.write_record(
                    step_id,
                    &TaskRecord { status: TaskState::Abort, ..TaskRecord::pending() },
                )
                .await;
                return Ok(StartOutcome::Aborted { step_id: step_id.to_string() });
            }
            Err(e) => {
                self.write_record(
                    step_id,
                    &TaskRecord { status: TaskState::Error, ..TaskRecord::pending() },
                )
                .await;
                return Err(e.into());
            }
        };

        let started_at_ms = self.clock.epoch_ms();
        self.write_record(step_id, &TaskRecord::running(started_at_ms)).await;
        tracing::info!(step_id, task_id = %task_id, container = %container.id(), "step running");

        Ok(StartOutcome::Started(Box::new(StartedStep {
            step_id: step_id.to_string(),
            task_id,
            name: input.name,
            container,
            started_at_ms,
            started: self.clock.now(),
            ctx: child,
            _timeout_guard: timeout_guard,
        })))
    }

    /// Steps 8–14: stream or fetch output, poll to completion, redact,
    /// schedule cleanup, write the terminal record.
    pub(crate) async fn finish_step(&self, step: StartedStep) -> Result<RunReport, RunnerError> {
        let container = step.container.clone();
        let ctx = step.ctx.clone();

        let streams = self.output.as_ref().map(|callback| {
            let (out_rx, out_tx) = tokio::io::duplex(PIPE_CAPACITY);
            let (err_rx, err_tx) = tokio::io::duplex(PIPE_CAPACITY);
            let log_ctx = ctx.clone();
            let log_container = container.clone();
            let logs = tokio::spawn(async move {
                log_container
                    .logs(&log_ctx, Box::new(out_tx), Box::new(err_tx), true)
                    .await
            });
            let stdout =
                tokio::spawn(pump_stream(out_rx, OutputStream::Stdout, callback.clone()));
            let stderr =
                tokio::spawn(pump_stream(err_rx, OutputStream::Stderr, callback.clone()));
            (logs, stdout, stderr)
        });

        // Poll to completion.
        let exit_code = loop {
            match container.status(&ctx).await {
                Ok(status) if status.is_done() => break Some(status.exit_code),
                Ok(_) => {
                    tokio::select! {
                        _ = ctx.cancelled() => break None,
                        _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    }
                }
                Err(e) if e.is_cancelled() || ctx.is_cancelled() => break None,
                Err(e) => {
                    self.schedule_cleanup(&step, &container);
                    self.write_record(
                        &step.step_id,
                        &TaskRecord { status: TaskState::Error, ..TaskRecord::pending() },
                    )
                    .await;
                    return Err(e.into());
                }
            }
        };

        let (mut stdout, mut stderr) = match streams {
            Some((logs, out_task, err_task)) => {
                if exit_code.is_none() {
                    // Cancelled: stop the follower instead of waiting for EOF.
                    ctx.cancel();
                }
                if let Ok(Err(e)) = logs.await {
                    tracing::warn!(step_id = %step.step_id, error = %e, "log streaming failed");
                }
                let out = out_task.await.unwrap_or_default();
                let err = err_task.await.unwrap_or_default();
                (out, err)
            }
            None if exit_code.is_some() => self.fetch_logs(&container).await,
            None => (Vec::new(), Vec::new()),
        };

        // Redact before anything leaves the runner.
        let secret_values = self.secret_values.lock().clone();
        if !secret_values.is_empty() {
            stdout = redact(&String::from_utf8_lossy(&stdout), &secret_values).into_bytes();
            stderr = redact(&String::from_utf8_lossy(&stderr), &secret_values).into_bytes();
        }
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        self.schedule_cleanup(&step, &container);

        let elapsed = format_elapsed(self.clock.now().duration_since(step.started));
        let report = match exit_code {
            Some(code) => {
                let status =
                    if code == 0 { TaskState::Success } else { TaskState::Failure };
                self.write_record(
                    &step.step_id,
                    &TaskRecord {
                        status,
                        code: Some(code),
                        stdout: Some(stdout.clone()),
                        stderr: Some(stderr.clone()),
                        started_at: Some(step.started_at_ms),
                        elapsed: Some(elapsed.clone()),
                    },
                )
                .await;
                RunReport {
                    result: RunResult { status: RunStatus::Complete, code, stdout, stderr },
                    step_id: step.step_id,
                    task_id: step.task_id,
                    container_id: container.id().to_string(),
                }
            }
            None => {
                self.write_record(
                    &step.step_id,
                    &TaskRecord {
                        status: TaskState::Abort,
                        started_at: Some(step.started_at_ms),
                        elapsed: Some(elapsed.clone()),
                        ..TaskRecord::pending()
                    },
                )
                .await;
                RunReport {
                    result: RunResult::aborted(),
                    step_id: step.step_id,
                    task_id: step.task_id,
                    container_id: container.id().to_string(),
                }
            }
        };
        tracing::info!(
            step_id = %report.step_id,
            status = %report.result.status,
            code = report.result.code,
            %elapsed,
            "step finished"
        );
        Ok(report)
    }

    /// Fetch accumulated logs once (non-follow path).
    async fn fetch_logs(&self, container: &Arc<dyn Container>) -> (Vec<u8>, Vec<u8>) {
        let ctx = CancellationToken::new();
        let (mut out_rx, out_tx) = tokio::io::duplex(PIPE_CAPACITY);
        let (mut err_rx, err_tx) = tokio::io::duplex(PIPE_CAPACITY);
        let fetch_container = container.clone();
        let fetch = tokio::spawn(async move {
            fetch_container.logs(&ctx, Box::new(out_tx), Box::new(err_tx), false).await
        });
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let _ = tokio::join!(out_rx.read_to_end(&mut stdout), err_rx.read_to_end(&mut stderr));
        if let Ok(Err(e)) = fetch.await {
            tracing::warn!(error = %e, "log fetch failed");
        }
        (stdout, stderr)
    }

    /// Cleanup runs unconditionally, detached from the step context so
    /// cancellation cannot skip it.
    fn schedule_cleanup(&self, step: &StartedStep, container: &Arc<dyn Container>) {
        let container = container.clone();
        let step_id = step.step_id.clone();
        tokio::spawn(async move {
            let ctx = CancellationToken::new();
            if let Err(e) = container.cleanup(&ctx).await {
                tracing::warn!(step_id = %step_id, error = %e, "container cleanup failed");
            }
        });
    }

    async fn load_secret(&self, name: &str) -> Result<Option<String>, RunnerError> {
        let Some(secrets) = &self.secrets else {
            return Ok(None);
        };
        let scoped = secrets
            .get(SecretScope::Pipeline(self.run_id.as_str().to_string()), name)
            .await?;
        let value = match scoped {
            Some(v) => Some(v),
            None => secrets.get(SecretScope::Global, name).await?,
        };
        if let Some(v) = &value {
            if !v.is_empty() {
                self.secret_values.lock().push(v.clone());
            }
        }
        Ok(value)
    }

    async fn write_record(&self, step_id: &str, record: &TaskRecord) {
        let Some(store) = &self.store else { return };
        let key = keys::task_status_key(self.run_id.as_str(), step_id);
        match serde_json::to_value(record) {
            Ok(value) => {
                if let Err(e) = store.put(&key, &value).await {
                    tracing::warn!(key, error = %e, "task status write failed");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "task status encode failed"),
        }
    }

    /// Create (or return the pre-seeded) volume and track it for cleanup.
    pub async fn create_volume(
        &self,
        ctx: &CancellationToken,
        input: VolumeInput,
    ) -> Result<VolumeResult, RunnerError> {
        let name = match input.name {
            Some(name) => name,
            // Deterministic auto-name: scripts that skip naming still get
            // stable identity across resume attempts.
            None => format!("volume-{}", self.volumes.lock().len()),
        };

        if let Some(seeded) = self.preseeded.lock().get(&name).cloned() {
            tracing::debug!(volume = %name, "using pre-seeded volume");
            self.volumes.lock().push(seeded);
            return Ok(VolumeResult { name });
        }

        let volume =
            self.driver.create_volume(ctx, &name, input.size_bytes.unwrap_or(0)).await?;
        let volume = match &self.volume_wrapper {
            Some(wrap) => {
                let key = kiln_cache::cache_key(
                    &self.namespace,
                    self.run_id.as_str(),
                    &format!("{}-volume", self.volumes.lock().len()),
                    &name,
                );
                wrap(volume, key).await
            }
            None => volume,
        };
        self.volumes.lock().push(volume);
        Ok(VolumeResult { name })
    }

    /// Clean up every tracked volume exactly once, in insertion order.
    /// Errors are collected, never short-circuited.
    pub async fn cleanup_volumes(&self, ctx: &CancellationToken) -> Result<(), RunnerError> {
        let volumes: Vec<_> = std::mem::take(&mut *self.volumes.lock());
        let mut failures = Vec::new();
        for volume in volumes {
            if let Err(e) = volume.cleanup(ctx).await {
                tracing::warn!(volume = %volume.name(), error = %e, "volume cleanup failed");
                failures.push(format!("{}: {}", volume.name(), e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunnerError::Cleanup(failures.join("; ")))
        }
    }
}

/// Read a pipe in ≤4 KiB chunks, buffering and invoking the callback for
/// each non-empty read.
async fn pump_stream(
    mut pipe: tokio::io::DuplexStream,
    stream: OutputStream,
    callback: OutputCallback,
) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; STREAM_CHUNK];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                callback(stream, &chunk[..n]);
            }
        }
    }
    buffer
}

/// Deterministic task ID: first four hex chars of
/// `sha256(namespace, run_id, step_id, name)`.
pub fn derive_task_id(namespace: &str, run_id: &str, step_id: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(run_id.as_bytes());
    hasher.update(step_id.as_bytes());
    hasher.update(name.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..4].to_string()
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
