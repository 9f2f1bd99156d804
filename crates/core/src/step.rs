// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable step and pipeline state for resumable execution.
//!
//! A [`PipelineState`] is loaded (or created) at run start and persisted
//! after every step transition. Step identity is positional — the Nth call
//! with a given name produces the same `step_id` on every attempt — which
//! is what lets a resumed run skip completed steps and reattach to ones
//! still running.

use crate::RunId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Lifecycle of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

crate::simple_display! {
    StepStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Aborted => "aborted",
    }
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Durable record of one step within a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub step_id: String,
    pub name: String,
    pub status: StepStatus,
    /// Driver-scoped container ID, set once the container is created.
    /// Empty until then; the hook for reattachment on resume.
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub task_id: String,
    /// Epoch milliseconds.
    pub started_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    /// Cached run result for skippable steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepState {
    pub fn new(step_id: impl Into<String>, name: impl Into<String>, started_at: u64) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            status: StepStatus::Pending,
            container_id: String::new(),
            task_id: String::new(),
            started_at,
            completed_at: None,
            exit_code: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A step that can be reattached: still running with a known container.
    pub fn is_resumable(&self) -> bool {
        self.status == StepStatus::Running && !self.container_id.is_empty()
    }

    /// A step whose cached result can be returned without touching the driver.
    pub fn is_skippable(&self) -> bool {
        self.status == StepStatus::Completed && self.result.is_some()
    }
}

/// Durable state of one pipeline run, keyed by run ID in the state store.
///
/// Invariant: `step_order` contains each key of `steps` exactly once, in
/// insertion order. All mutation goes through [`PipelineState::upsert_step`]
/// to keep that true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: RunId,
    pub steps: HashMap<String, StepState>,
    pub step_order: Vec<String>,
    pub started_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(default)]
    pub resume_enabled: bool,
}

impl PipelineState {
    pub fn new(run_id: RunId, started_at: u64, resume_enabled: bool) -> Self {
        Self {
            run_id,
            steps: HashMap::new(),
            step_order: Vec::new(),
            started_at,
            completed_at: None,
            resume_enabled,
        }
    }

    /// Insert or replace a step, appending to `step_order` only on first sight.
    pub fn upsert_step(&mut self, step: StepState) {
        if !self.steps.contains_key(&step.step_id) {
            self.step_order.push(step.step_id.clone());
        }
        self.steps.insert(step.step_id.clone(), step);
    }

    pub fn step(&self, step_id: &str) -> Option<&StepState> {
        self.steps.get(step_id)
    }

    /// Steps in insertion order.
    pub fn ordered_steps(&self) -> impl Iterator<Item = &StepState> {
        self.step_order.iter().filter_map(|id| self.steps.get(id))
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
