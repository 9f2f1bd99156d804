// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend resource naming.
//!
//! Containers are named `{namespace}-{task_name}-{task_id}`. The task ID is
//! a deterministic content hash, so reruns of the same step produce the
//! same name and backends can treat creation as idempotent.

use kiln_core::sanitize_name;

/// Docker and Kubernetes both cap object names at 63 characters.
pub const BACKEND_NAME_CEILING: usize = 63;

/// Build the container name for a task within a namespace.
///
/// The user-supplied task name is sanitized; namespace and task ID are
/// assumed already safe (the namespace is validated at driver construction
/// and the ID is hex). The middle segment shrinks to honor `max_len`.
pub fn container_name(namespace: &str, task_name: &str, task_id: &str, max_len: usize) -> String {
    // Reserve room for both separators and the fixed segments.
    let fixed = namespace.len() + task_id.len() + 2;
    let budget = max_len.saturating_sub(fixed).max(1);
    let middle = sanitize_name(task_name, budget);
    if middle.is_empty() {
        format!("{}-{}", namespace, task_id)
    } else {
        format!("{}-{}-{}", namespace, middle, task_id)
    }
}

/// Volume names are `{namespace}-{name}`, sanitized.
pub fn volume_name(namespace: &str, name: &str, max_len: usize) -> String {
    let budget = max_len.saturating_sub(namespace.len() + 1).max(1);
    let tail = sanitize_name(name, budget);
    format!("{}-{}", namespace, tail)
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod tests;
