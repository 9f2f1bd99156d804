// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-memory driver for tests.
//!
//! Records every call and lets tests program per-task outcomes (exit code,
//! output, completion delay). Containers become `done` once their configured
//! delay elapses, so timeout and polling behavior is exercised for real.

use crate::{Container, Driver, DriverError, LogSink, Volume};
use async_trait::async_trait;
use kiln_core::{ContainerStatus, TaskSpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    RunContainer { task_id: String, name: String },
    CreateVolume { name: String },
    GetContainer { id: String },
    Close,
}

/// Programmed result for a task.
#[derive(Debug, Clone)]
pub struct FakeOutcome {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    /// How long the container "runs" before reporting done.
    pub delay: Duration,
}

impl Default for FakeOutcome {
    fn default() -> Self {
        Self { exit_code: 0, stdout: String::new(), stderr: String::new(), delay: Duration::ZERO }
    }
}

impl FakeOutcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), ..Self::default() }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self { exit_code, stderr: stderr.into(), ..Self::default() }
    }

    /// A container that never finishes within any sane test budget.
    pub fn hung() -> Self {
        Self { delay: Duration::from_secs(3600), ..Self::default() }
    }

    kiln_core::setters! {
        set {
            delay: Duration,
        }
    }
}

/// In-memory [`Driver`] with scripted outcomes.
pub struct FakeDriver {
    namespace: String,
    calls: Mutex<Vec<FakeCall>>,
    outcomes: Mutex<HashMap<String, FakeOutcome>>,
    containers: Mutex<HashMap<String, Arc<FakeContainer>>>,
    volumes: Mutex<Vec<Arc<FakeVolume>>>,
    closed: AtomicBool,
}

impl FakeDriver {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            calls: Mutex::new(Vec::new()),
            outcomes: Mutex::new(HashMap::new()),
            containers: Mutex::new(HashMap::new()),
            volumes: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Program the outcome for tasks named `name`.
    pub fn on_task(&self, name: &str, outcome: FakeOutcome) {
        self.outcomes.lock().insert(name.to_string(), outcome);
    }

    /// Everything the driver was asked to do, in order.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().clone()
    }

    /// Number of `run_container` calls seen.
    pub fn run_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, FakeCall::RunContainer { .. }))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pre-seed a running container so reattachment paths can find it.
    pub fn insert_container(&self, id: &str, outcome: FakeOutcome) -> Arc<FakeContainer> {
        let container = Arc::new(FakeContainer::new(id, outcome));
        self.containers.lock().insert(id.to_string(), container.clone());
        container
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn run_container(
        &self,
        ctx: &CancellationToken,
        task: TaskSpec,
    ) -> Result<Arc<dyn Container>, DriverError> {
        if ctx.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        self.calls
            .lock()
            .push(FakeCall::RunContainer { task_id: task.id.clone(), name: task.name.clone() });

        let id = format!("fake-{}-{}", self.namespace, task.id);
        let mut containers = self.containers.lock();
        if let Some(existing) = containers.get(&id) {
            return Ok(existing.clone() as Arc<dyn Container>);
        }
        let outcome = self.outcomes.lock().get(&task.name).cloned().unwrap_or_default();
        let container = Arc::new(FakeContainer::new(&id, outcome));
        containers.insert(id, container.clone());
        Ok(container as Arc<dyn Container>)
    }

    async fn create_volume(
        &self,
        _ctx: &CancellationToken,
        name: &str,
        _size_bytes: u64,
    ) -> Result<Arc<dyn Volume>, DriverError> {
        self.calls.lock().push(FakeCall::CreateVolume { name: name.to_string() });
        let mut volumes = self.volumes.lock();
        if let Some(existing) = volumes.iter().find(|v| v.name == name) {
            return Ok(existing.clone() as Arc<dyn Volume>);
        }
        let volume = Arc::new(FakeVolume { name: name.to_string(), cleanups: AtomicUsize::new(0) });
        volumes.push(volume.clone());
        Ok(volume as Arc<dyn Volume>)
    }

    async fn get_container(
        &self,
        _ctx: &CancellationToken,
        id: &str,
    ) -> Result<Arc<dyn Container>, DriverError> {
        self.calls.lock().push(FakeCall::GetContainer { id: id.to_string() });
        self.containers
            .lock()
            .get(id)
            .cloned()
            .map(|c| c as Arc<dyn Container>)
            .ok_or_else(|| DriverError::ContainerNotFound(id.to_string()))
    }

    async fn close(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        self.calls.lock().push(FakeCall::Close);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Container whose status flips to done after the programmed delay.
pub struct FakeContainer {
    id: String,
    outcome: FakeOutcome,
    started: Instant,
    cleanups: AtomicUsize,
}

impl FakeContainer {
    fn new(id: &str, outcome: FakeOutcome) -> Self {
        Self { id: id.to_string(), outcome, started: Instant::now(), cleanups: AtomicUsize::new(0) }
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    fn is_done(&self) -> bool {
        self.started.elapsed() >= self.outcome.delay
    }
}

#[async_trait]
impl Container for FakeContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn status(&self, ctx: &CancellationToken) -> Result<ContainerStatus, DriverError> {
        if ctx.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        if self.is_done() {
            Ok(ContainerStatus::exited(self.outcome.exit_code))
        } else {
            Ok(ContainerStatus::running())
        }
    }

    async fn logs(
        &self,
        ctx: &CancellationToken,
        mut stdout: LogSink,
        mut stderr: LogSink,
        follow: bool,
    ) -> Result<(), DriverError> {
        if follow {
            // Stream once the container finishes, or bail on cancel.
            while !self.is_done() {
                if ctx.is_cancelled() {
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        stdout.write_all(self.outcome.stdout.as_bytes()).await?;
        stdout.shutdown().await?;
        stderr.write_all(self.outcome.stderr.as_bytes()).await?;
        stderr.shutdown().await?;
        Ok(())
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Volume that only counts its cleanups.
pub struct FakeVolume {
    name: String,
    cleanups: AtomicUsize,
}

impl FakeVolume {
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Volume for FakeVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> Option<PathBuf> {
        None
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
