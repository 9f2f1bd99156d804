// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task inputs and results.
//!
//! A [`TaskSpec`] is the driver-facing description of one container step.
//! [`RunResult`] is what the pipeline runner hands back to the script, and
//! [`TaskRecord`] is the per-task status row persisted to the state store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A volume attachment: volume name plus the in-container mount path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub volume: String,
    pub path: String,
}

impl Mount {
    pub fn new(volume: impl Into<String>, path: impl Into<String>) -> Self {
        Self { volume: volume.into(), path: path.into() }
    }
}

/// Driver-facing description of one container task.
///
/// `id` is stable within a run: a driver seeing the same id twice must hand
/// back the existing container rather than creating a second one. `env` and
/// `mounts` preserve insertion order so container naming and mount setup
/// are deterministic across resume attempts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Numeric user identity. Backends that take user names don't get one here.
    #[serde(default)]
    pub user: Option<u32>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub cpu_shares: Option<u64>,
    #[serde(default)]
    pub memory_bytes: Option<u64>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    /// Bytes to feed the container on stdin. `None` means no stdin at all;
    /// some backends treat "attached but empty" differently from "absent",
    /// so construction must never turn an absent stdin into `Some(vec![])`.
    #[serde(skip)]
    pub stdin: Option<Vec<u8>>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, image: impl Into<String>, command: Vec<String>) -> Self {
        Self { id: id.into(), image: image.into(), command, ..Default::default() }
    }

    crate::setters! {
        into {
            name: String,
        }
        set {
            env: IndexMap<String, String>,
            mounts: Vec<Mount>,
            privileged: bool,
        }
        option {
            cwd: String,
            user: u32,
            cpu_shares: u64,
            memory_bytes: u64,
            stdin: Vec<u8>,
        }
    }
}

/// Point-in-time container status.
///
/// Once `done` is true the exit code is stable: drivers must report the
/// same code on every subsequent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub done: bool,
    pub exit_code: i64,
}

impl ContainerStatus {
    pub fn running() -> Self {
        Self { done: false, exit_code: 0 }
    }

    pub fn exited(exit_code: i64) -> Self {
        Self { done: true, exit_code }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// How a `run` call concluded, from the script's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The container ran to completion (any exit code).
    Complete,
    /// The surrounding context was cancelled or timed out. No output guarantee.
    Abort,
}

crate::simple_display! {
    RunStatus {
        Complete => "complete",
        Abort => "abort",
    }
}

/// Result of one `run` call, returned to the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn aborted() -> Self {
        Self { status: RunStatus::Abort, code: -1, stdout: String::new(), stderr: String::new() }
    }
}

/// Task status as persisted to the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failure,
    Abort,
    Error,
}

crate::simple_display! {
    TaskState {
        Pending => "pending",
        Running => "running",
        Success => "success",
        Failure => "failure",
        Abort => "abort",
        Error => "error",
    }
}

/// Per-task status row written under `/pipeline/{run_id}/tasks/{step_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Epoch milliseconds when the task entered `running`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    /// Human-readable duration, e.g. `"2m 3s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<String>,
}

impl TaskRecord {
    pub fn pending() -> Self {
        Self {
            status: TaskState::Pending,
            code: None,
            stdout: None,
            stderr: None,
            started_at: None,
            elapsed: None,
        }
    }

    pub fn running(started_at: u64) -> Self {
        Self { status: TaskState::Running, started_at: Some(started_at), ..Self::pending() }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
