// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and PVC spec construction for the Kubernetes driver.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container as PodContainer, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecurityContext, Volume as PodVolume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kiln_core::TaskSpec;
use std::collections::BTreeMap;

pub(crate) const TASK_CONTAINER: &str = "task";
pub(crate) const NAMESPACE_LABEL: &str = "kiln/namespace";
pub(crate) const TASK_LABEL: &str = "kiln/task-id";

/// Inputs for building a Job spec.
pub(crate) struct JobParams<'a> {
    pub job_name: String,
    pub namespace: &'a str,
    pub k8s_namespace: &'a str,
    pub task: &'a TaskSpec,
    /// Backend PVC name per volume (same order as `task.mounts`).
    pub claim_names: Vec<String>,
}

/// CPU shares → Kubernetes millicores: `(shares · 1000) / 1024`.
pub(crate) fn millicores(shares: u64) -> u64 {
    shares * 1000 / 1024
}

pub(crate) fn labels(namespace: &str, task_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (NAMESPACE_LABEL.to_string(), namespace.to_string()),
        (TASK_LABEL.to_string(), task_id.to_string()),
    ])
}

/// Build the Job wrapping a single-pod task with no retries.
pub(crate) fn build_job(params: &JobParams<'_>) -> Job {
    let task = params.task;

    let env: Vec<EnvVar> = task
        .env
        .iter()
        .map(|(k, v)| EnvVar { name: k.clone(), value: Some(v.clone()), value_from: None })
        .collect();

    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();
    for (mount, claim) in task.mounts.iter().zip(&params.claim_names) {
        volumes.push(PodVolume {
            name: claim.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.clone(),
                read_only: None,
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: claim.clone(),
            mount_path: mount.path.clone(),
            ..Default::default()
        });
    }

    let mut requests = BTreeMap::new();
    if let Some(shares) = task.cpu_shares {
        requests.insert("cpu".to_string(), Quantity(format!("{}m", millicores(shares))));
    }
    if let Some(memory) = task.memory_bytes {
        requests.insert("memory".to_string(), Quantity(memory.to_string()));
    }

    let security_context = (task.user.is_some() || task.privileged).then(|| SecurityContext {
        run_as_user: task.user.map(i64::from),
        privileged: task.privileged.then_some(true),
        ..Default::default()
    });

    let container = PodContainer {
        name: TASK_CONTAINER.to_string(),
        image: Some(task.image.clone()),
        command: Some(task.command.clone()),
        working_dir: task.cwd.clone(),
        env: (!env.is_empty()).then_some(env),
        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
        resources: (!requests.is_empty()).then(|| ResourceRequirements {
            requests: Some(requests),
            ..Default::default()
        }),
        security_context,
        stdin: task.stdin.is_some().then_some(true),
        stdin_once: task.stdin.is_some().then_some(true),
        ..Default::default()
    };

    let labels = labels(params.namespace, &task.id);
    Job {
        metadata: ObjectMeta {
            name: Some(params.job_name.clone()),
            namespace: Some(params.k8s_namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![container],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Build a PVC backing one named volume.
pub(crate) fn build_claim(
    claim_name: &str,
    namespace: &str,
    k8s_namespace: &str,
    size_bytes: u64,
) -> PersistentVolumeClaim {
    // Zero means "caller didn't care"; ask for something small but real.
    let size = if size_bytes == 0 { 1 << 30 } else { size_bytes };
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(claim_name.to_string()),
            namespace: Some(k8s_namespace.to_string()),
            labels: Some(BTreeMap::from([(
                NAMESPACE_LABEL.to_string(),
                namespace.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
