// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn joins_segments() {
    assert_eq!(container_name("ci", "Build App", "a1b2", 63), "ci-build-app-a1b2");
}

#[test]
fn deterministic_for_same_inputs() {
    let a = container_name("ci", "build", "a1b2", 63);
    let b = container_name("ci", "build", "a1b2", 63);
    assert_eq!(a, b);
}

#[test]
fn respects_ceiling() {
    let long = "a very long task name that would overflow the backend limit entirely";
    let name = container_name("namespace", long, "a1b2", BACKEND_NAME_CEILING);
    assert!(name.len() <= BACKEND_NAME_CEILING, "{} is too long", name);
    assert!(name.starts_with("namespace-"));
    assert!(name.ends_with("-a1b2"));
}

#[test]
fn empty_task_name_collapses() {
    assert_eq!(container_name("ci", "!!!", "a1b2", 63), "ci-a1b2");
}

#[test]
fn volume_names_are_namespaced() {
    assert_eq!(volume_name("ci", "Build Cache", 63), "ci-build-cache");
}
