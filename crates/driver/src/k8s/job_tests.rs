// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kiln_core::Mount;
use yare::parameterized;

fn task() -> TaskSpec {
    let mut task = TaskSpec::new("a1b2", "busybox", vec!["echo".to_string(), "hi".to_string()])
        .name("build")
        .cwd("/work")
        .user(1000u32)
        .cpu_shares(512u64)
        .memory_bytes(64u64 * 1024 * 1024);
    task.env.insert("FOO".to_string(), "bar".to_string());
    task.mounts = vec![Mount::new("cache", "/cache")];
    task
}

fn params(task: &TaskSpec) -> JobParams<'_> {
    JobParams {
        job_name: "ci-build-a1b2".to_string(),
        namespace: "ci",
        k8s_namespace: "default",
        task,
        claim_names: vec!["ci-cache".to_string()],
    }
}

#[parameterized(
    full_share = { 1024, 1000 },
    half_share = { 512, 500 },
    small = { 2, 1 },
    zero = { 0, 0 },
)]
fn shares_to_millicores(shares: u64, expected: u64) {
    assert_eq!(millicores(shares), expected);
}

#[test]
fn job_wraps_pod_with_no_retries() {
    let task = task();
    let job = build_job(&params(&task));

    let spec = job.spec.unwrap();
    assert_eq!(spec.backoff_limit, Some(0));
    let pod = spec.template.spec.unwrap();
    assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
    assert_eq!(pod.containers.len(), 1);
}

#[test]
fn container_carries_task_fields() {
    let task = task();
    let job = build_job(&params(&task));
    let pod = job.spec.unwrap().template.spec.unwrap();
    let container = &pod.containers[0];

    assert_eq!(container.name, TASK_CONTAINER);
    assert_eq!(container.image.as_deref(), Some("busybox"));
    assert_eq!(container.working_dir.as_deref(), Some("/work"));
    assert_eq!(container.command.as_ref().unwrap(), &vec!["echo".to_string(), "hi".to_string()]);

    let sc = container.security_context.as_ref().unwrap();
    assert_eq!(sc.run_as_user, Some(1000));
    assert_eq!(sc.privileged, None);

    let requests = container.resources.as_ref().unwrap().requests.as_ref().unwrap();
    assert_eq!(requests["cpu"].0, "500m");
    assert_eq!(requests["memory"].0, (64u64 * 1024 * 1024).to_string());
}

#[test]
fn mounts_become_pvc_volumes() {
    let task = task();
    let job = build_job(&params(&task));
    let pod = job.spec.unwrap().template.spec.unwrap();

    let volumes = pod.volumes.unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(
        volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name,
        "ci-cache"
    );
    let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
    assert_eq!(mounts[0].mount_path, "/cache");
}

#[test]
fn stdin_flags_set_only_when_present() {
    let mut task = task();
    let job = build_job(&params(&task));
    assert_eq!(job.spec.unwrap().template.spec.unwrap().containers[0].stdin, None);

    task.stdin = Some(b"data".to_vec());
    let job = build_job(&params(&task));
    let container = &job.spec.unwrap().template.spec.unwrap().containers[0];
    assert_eq!(container.stdin, Some(true));
    assert_eq!(container.stdin_once, Some(true));
}

#[test]
fn labels_tag_job_and_pod() {
    let task = task();
    let job = build_job(&params(&task));
    let labels = job.metadata.labels.unwrap();
    assert_eq!(labels[NAMESPACE_LABEL], "ci");
    assert_eq!(labels[TASK_LABEL], "a1b2");

    let pod_labels =
        job.spec.unwrap().template.metadata.unwrap().labels.unwrap();
    assert_eq!(pod_labels[NAMESPACE_LABEL], "ci");
}

#[test]
fn claim_defaults_to_a_gibibyte() {
    let claim = build_claim("ci-cache", "ci", "default", 0);
    let spec = claim.spec.unwrap();
    let requests = spec.resources.unwrap().requests.unwrap();
    assert_eq!(requests["storage"].0, (1u64 << 30).to_string());
}
