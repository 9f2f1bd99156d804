// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn task_spec_builder_chains() {
    let mut env = IndexMap::new();
    env.insert("A".to_string(), "1".to_string());
    let spec = TaskSpec::new("0-hello", "busybox", vec!["echo".into(), "hi".into()])
        .name("hello")
        .env(env)
        .cwd("/work")
        .user(1000u32)
        .mounts(vec![Mount::new("v", "/v")]);

    assert_eq!(spec.name, "hello");
    assert_eq!(spec.cwd.as_deref(), Some("/work"));
    assert_eq!(spec.user, Some(1000));
    assert_eq!(spec.mounts[0].volume, "v");
    assert!(spec.stdin.is_none());
}

#[test]
fn env_preserves_insertion_order() {
    let mut env = IndexMap::new();
    env.insert("Z".to_string(), "1".to_string());
    env.insert("A".to_string(), "2".to_string());
    let spec = TaskSpec::new("t", "img", vec![]).env(env);
    let keys: Vec<_> = spec.env.keys().cloned().collect();
    assert_eq!(keys, vec!["Z", "A"]);
}

#[test]
fn container_status_constructors() {
    assert!(!ContainerStatus::running().is_done());
    let done = ContainerStatus::exited(3);
    assert!(done.is_done());
    assert_eq!(done.exit_code, 3);
}

#[test]
fn run_status_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&RunStatus::Abort).unwrap(), "\"abort\"");
    assert_eq!(RunStatus::Complete.to_string(), "complete");
}

#[test]
fn task_record_omits_absent_fields() {
    let json = serde_json::to_value(TaskRecord::pending()).unwrap();
    assert_eq!(json, serde_json::json!({"status": "pending"}));

    let json = serde_json::to_value(TaskRecord::running(123)).unwrap();
    assert_eq!(json, serde_json::json!({"status": "running", "started_at": 123}));
}

#[test]
fn aborted_result_has_no_output() {
    let r = RunResult::aborted();
    assert_eq!(r.status, RunStatus::Abort);
    assert!(r.stdout.is_empty() && r.stderr.is_empty());
}
