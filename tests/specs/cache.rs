// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume cache specs: contents survive across runs through the cache
//! store when the DSN opts in.

use kiln_engine::{Executor, ExecutorConfig};
use kiln_storage::MemoryStateStore;
use std::sync::Arc;

fn config(driver_root: &std::path::Path, cache_dir: &std::path::Path, run_id: &str) -> ExecutorConfig {
    ExecutorConfig::new(format!(
        "native:root={},cache_store={}",
        driver_root.display(),
        cache_dir.display(),
    ))
    .run_id(run_id.to_string())
    .state_store(Arc::new(MemoryStateStore::new()))
}

#[tokio::test]
async fn volume_contents_restore_from_cache_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");

    let write_script = r#"
        export async function pipeline() {
            await runtime.createVolume({ name: "data" });
            await runtime.run({
                name: "writer",
                image: "busybox",
                command: ["/bin/sh", "-c", "printf cached-content > data/artifact"],
                mounts: { data: "/data" },
            });
        }
    "#;
    // Same run id: the cache key is deterministic within a run, so the
    // rerun collides with the first run's entry.
    Executor::new()
        .run(config(&dir.path().join("d1"), &cache_dir, "run-c"), write_script)
        .await
        .unwrap();

    // The cache store now holds a compressed entry.
    assert!(cache_dir.read_dir().unwrap().count() > 0);

    // A rerun with a fresh driver root sees the restored contents without
    // the writer step having to produce them.
    let read_script = r#"
        export async function pipeline() {
            await runtime.createVolume({ name: "data" });
            const result = await runtime.run({
                name: "reader",
                image: "busybox",
                command: ["/bin/sh", "-c", "cat data/artifact"],
                mounts: { data: "/data" },
            });
            return result.stdout;
        }
    "#;
    let report = Executor::new()
        .run(config(&dir.path().join("d2"), &cache_dir, "run-c"), read_script)
        .await
        .unwrap();
    assert_eq!(report.value, serde_json::json!("cached-content"));
}

#[tokio::test]
async fn cache_disabled_without_the_param() {
    let dir = tempfile::tempdir().unwrap();

    let script = r#"
        export async function pipeline() {
            await runtime.createVolume({ name: "data" });
            await runtime.run({
                name: "writer",
                image: "busybox",
                command: ["/bin/sh", "-c", "printf x > data/f"],
                mounts: { data: "/data" },
            });
        }
    "#;
    Executor::new()
        .run(
            ExecutorConfig::new(format!("native:root={}", dir.path().join("d").display()))
                .run_id("run-nc".to_string())
                .state_store(Arc::new(MemoryStateStore::new())),
            script,
        )
        .await
        .unwrap();

    // No cache directory materialized anywhere in the sandbox.
    assert!(!dir.path().join("cache").exists());
}
