// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State store key layout.
//!
//! ```text
//! /pipeline/{run_id}/tasks/{step_id}   per-task status row
//! _resume/state/{run_id}               serialized pipeline state
//! /pipeline/{run_id}/                  prefix queried for UI rendering
//! ```

/// Key for one task's status row.
pub fn task_status_key(run_id: &str, step_id: &str) -> String {
    format!("/pipeline/{}/tasks/{}", run_id, step_id)
}

/// Prefix covering everything written for one run.
pub fn pipeline_prefix(run_id: &str) -> String {
    format!("/pipeline/{}/", run_id)
}

/// Key for a run's serialized resume state.
pub fn resume_state_key(run_id: &str) -> String {
    format!("_resume/state/{}", run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(task_status_key("run-1", "0-build"), "/pipeline/run-1/tasks/0-build");
        assert_eq!(resume_state_key("run-1"), "_resume/state/run-1");
        assert!(task_status_key("run-1", "0-build").starts_with(&pipeline_prefix("run-1")));
    }
}
