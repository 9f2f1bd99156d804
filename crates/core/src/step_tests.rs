// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn step(id: &str, status: StepStatus) -> StepState {
    let mut s = StepState::new(id, "build", 1);
    s.status = status;
    s
}

#[test]
fn terminal_statuses() {
    assert!(StepStatus::Completed.is_terminal());
    assert!(StepStatus::Failed.is_terminal());
    assert!(StepStatus::Aborted.is_terminal());
    assert!(!StepStatus::Pending.is_terminal());
    assert!(!StepStatus::Running.is_terminal());
}

#[test]
fn resumable_requires_running_and_container() {
    let mut s = step("0-build", StepStatus::Running);
    assert!(!s.is_resumable());
    s.container_id = "abc".to_string();
    assert!(s.is_resumable());
    s.status = StepStatus::Completed;
    assert!(!s.is_resumable());
}

#[test]
fn skippable_requires_completed_with_result() {
    let mut s = step("0-build", StepStatus::Completed);
    assert!(!s.is_skippable());
    s.result = Some(json!({"code": 0}));
    assert!(s.is_skippable());
    s.status = StepStatus::Aborted;
    assert!(!s.is_skippable());
}

#[test]
fn upsert_preserves_insertion_order() {
    let mut state = PipelineState::new(RunId::from_string("run-r"), 0, true);
    state.upsert_step(step("0-a", StepStatus::Running));
    state.upsert_step(step("1-b", StepStatus::Running));
    state.upsert_step(step("0-a", StepStatus::Completed));

    assert_eq!(state.step_order, vec!["0-a", "1-b"]);
    assert_eq!(state.steps.len(), 2);
    assert_eq!(state.step("0-a").map(|s| s.status), Some(StepStatus::Completed));

    let ordered: Vec<_> = state.ordered_steps().map(|s| s.step_id.as_str()).collect();
    assert_eq!(ordered, vec!["0-a", "1-b"]);
}

#[test]
fn state_survives_serde_round_trip() {
    let mut state = PipelineState::new(RunId::from_string("run-r"), 7, true);
    let mut s = step("0-a", StepStatus::Completed);
    s.result = Some(json!({"code": 0, "stdout": "hi"}));
    state.upsert_step(s);

    let json = serde_json::to_value(&state).unwrap();
    let back: PipelineState = serde_json::from_value(json).unwrap();
    assert_eq!(back.step_order, state.step_order);
    assert!(back.step("0-a").is_some_and(|s| s.is_skippable()));
    assert!(back.resume_enabled);
}
