// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Orchestration drivers — one uniform contract over heterogeneous backends.
//!
//! A [`Driver`] owns a namespace and hands out [`Container`] and [`Volume`]
//! handles against one backend: the Docker CLI, host processes, Kubernetes
//! Jobs, or a QEMU microvm. All four expose the same lifecycle, log
//! streaming, and reattachment contract, so everything above this crate is
//! backend-agnostic.
//!
//! Drivers are resolved by DSN through the [`registry`]; see [`dsn`] for
//! the grammar.

pub mod backoff;
pub mod docker;
pub mod dsn;
pub mod k8s;
pub mod naming;
pub mod native;
pub mod qemu;
pub mod registry;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use kiln_core::{ContainerStatus, TaskSpec};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Sentinel for `get_container` with an unknown ID. The resumable
    /// runner matches this variant to fall back to fresh execution.
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("unsupported by driver {driver}: {what}")]
    Unsupported { driver: &'static str, what: String },
    /// The surrounding context was cancelled or timed out.
    #[error("operation cancelled")]
    Cancelled,
    #[error("driver configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContainerNotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Where a log stream's bytes go. Drivers write and flush; they never read.
pub type LogSink = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

/// Handle to one container (or backend equivalent).
#[async_trait]
pub trait Container: Send + Sync {
    /// Driver-scoped unique ID, stable for the container's lifetime.
    fn id(&self) -> &str;

    /// Point-in-time status. Once `done` is reported, the exit code must be
    /// identical on every later call.
    async fn status(&self, ctx: &CancellationToken) -> Result<ContainerStatus, DriverError>;

    /// Copy container output into the sinks.
    ///
    /// `follow = false` writes the output accumulated so far and returns.
    /// `follow = true` streams until the container finishes or `ctx` is
    /// cancelled, without buffering unboundedly. Backends that cannot
    /// separate the streams write everything to the stdout sink.
    async fn logs(
        &self,
        ctx: &CancellationToken,
        stdout: LogSink,
        stderr: LogSink,
        follow: bool,
    ) -> Result<(), DriverError>;

    /// Remove the container. Idempotent.
    async fn cleanup(&self, ctx: &CancellationToken) -> Result<(), DriverError>;
}

/// Handle to one named volume.
///
/// A volume is singleton per `(namespace, name)` within a driver instance:
/// requesting the same name twice returns the same backing store.
#[async_trait]
pub trait Volume: Send + Sync {
    fn name(&self) -> &str;

    /// Host-side directory backing the volume, when the backend has one.
    fn path(&self) -> Option<PathBuf>;

    /// Remove the volume. Idempotent.
    async fn cleanup(&self, ctx: &CancellationToken) -> Result<(), DriverError>;
}

/// One container backend.
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;

    /// The namespace tag shared by every resource this instance creates.
    fn namespace(&self) -> &str;

    /// Start (or rejoin) the container for a task.
    ///
    /// Idempotent on `task.id`: a second call with a previously-seen ID in
    /// this namespace returns a handle to the existing container.
    async fn run_container(
        &self,
        ctx: &CancellationToken,
        task: TaskSpec,
    ) -> Result<Arc<dyn Container>, DriverError>;

    /// Create (or return the existing) named volume.
    async fn create_volume(
        &self,
        ctx: &CancellationToken,
        name: &str,
        size_bytes: u64,
    ) -> Result<Arc<dyn Volume>, DriverError>;

    /// Reattach to a container by its driver-scoped ID.
    ///
    /// Returns [`DriverError::ContainerNotFound`] when the ID is unknown.
    async fn get_container(
        &self,
        ctx: &CancellationToken,
        id: &str,
    ) -> Result<Arc<dyn Container>, DriverError>;

    /// Remove every resource tagged with this instance's namespace.
    ///
    /// Transient conflicts are retried with exponential backoff; a failure
    /// to remove one resource does not skip the others. Two instances
    /// sharing a backend namespace are not coordinated — concurrent closes
    /// can race.
    async fn close(&self, ctx: &CancellationToken) -> Result<(), DriverError>;
}
