// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline specs: hello world, parallelism, volumes, timeouts, secrets.

use super::prelude::Sandbox;
use kiln_engine::{Executor, StaticSecretsManager};
use std::sync::Arc;

#[tokio::test]
async fn hello_world() {
    let sandbox = Sandbox::new();
    let value = sandbox
        .run(
            "run-hello",
            r#"
            export async function pipeline() {
                const result = await runtime.run({
                    name: "hello",
                    image: "busybox",
                    command: ["echo", "Hello, World!"],
                });
                assert.equal(result.code, 0);
                assert.containsString(result.stdout, "Hello, World!");
                return { code: result.code, stdout: result.stdout };
            }
            "#,
        )
        .await;

    assert_eq!(value["code"], 0);
    assert!(value["stdout"].as_str().unwrap().contains("Hello, World!"));

    let row = sandbox.task_row("run-hello", "0-hello").await;
    assert_eq!(row["status"], "success");
    assert!(!row["elapsed"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn parallel_tasks_both_complete() {
    let sandbox = Sandbox::new();
    let value = sandbox
        .run(
            "run-parallel",
            r#"
            export async function pipeline() {
                const [a, b] = await Promise.all([
                    runtime.run({ name: "a", image: "busybox", command: ["echo", "A"] }),
                    runtime.run({ name: "b", image: "busybox", command: ["echo", "B"] }),
                ]);
                assert.containsString(a.stdout, "A");
                assert.containsString(b.stdout, "B");
                return [a.stdout, b.stdout];
            }
            "#,
        )
        .await;

    assert!(value[0].as_str().unwrap().contains('A'));
    assert!(value[1].as_str().unwrap().contains('B'));

    // Two steps ran, with distinct call indexes 0 and 1 (which task got
    // which index depends on worker scheduling).
    use kiln_storage::StateStore;
    let rows = sandbox
        .store
        .list(&kiln_storage::keys::pipeline_prefix("run-parallel"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    let mut indexes: Vec<char> = rows
        .iter()
        .filter_map(|(key, _)| key.rsplit('/').next()?.chars().next())
        .collect();
    indexes.sort_unstable();
    assert_eq!(indexes, vec!['0', '1']);
    assert!(rows.iter().all(|(_, row)| row["status"] == "success"));
}

#[tokio::test]
async fn volume_hands_data_between_tasks() {
    let sandbox = Sandbox::new();
    let value = sandbox
        .run(
            "run-volume",
            r#"
            export async function pipeline() {
                await runtime.createVolume({ name: "v" });
                const writer = await runtime.run({
                    name: "writer",
                    image: "busybox",
                    command: ["/bin/sh", "-c", "printf world > v/hello"],
                    mounts: { v: "/v" },
                });
                assert.equal(writer.code, 0);

                const reader = await runtime.run({
                    name: "reader",
                    image: "busybox",
                    command: ["/bin/sh", "-c", "cat v/hello"],
                    mounts: { v: "/v" },
                });
                assert.equal(reader.code, 0);
                assert.containsString(reader.stdout, "world");
                return reader.stdout;
            }
            "#,
        )
        .await;
    assert_eq!(value, serde_json::json!("world"));
}

#[tokio::test]
async fn timeout_aborts_without_exception() {
    let sandbox = Sandbox::new();
    let value = sandbox
        .run(
            "run-timeout",
            r#"
            export async function pipeline() {
                const result = await runtime.run({
                    name: "sleepy",
                    image: "busybox",
                    command: ["sleep", "30"],
                    timeout: "500ms",
                });
                assert.equal(result.status, "abort");
                return result.status;
            }
            "#,
        )
        .await;
    assert_eq!(value, serde_json::json!("abort"));

    let row = sandbox.task_row("run-timeout", "0-sleepy").await;
    assert_eq!(row["status"], "abort");
}

#[tokio::test]
async fn secrets_resolve_and_redact() {
    let sandbox = Sandbox::new();
    let secrets = StaticSecretsManager::new().with_global("API_KEY", "hunter2");
    let config = sandbox.config("run-secret").secrets(Arc::new(secrets));

    let report = Executor::new()
        .run(
            config,
            r#"
            export async function pipeline() {
                const result = await runtime.run({
                    name: "leak",
                    image: "busybox",
                    command: ["/bin/sh", "-c", "echo password is $PASSWORD"],
                    env: { PASSWORD: "secret:API_KEY" },
                });
                assert.containsString(result.stdout, "***REDACTED***");
                return result.stdout;
            }
            "#,
        )
        .await
        .unwrap_or_else(|e| panic!("pipeline failed: {e}"));

    let stdout = report.value.as_str().unwrap();
    assert!(stdout.contains("***REDACTED***"));
    assert!(!stdout.contains("hunter2"));

    let row = sandbox.task_row("run-secret", "0-leak").await;
    let stored = row["stdout"].as_str().unwrap();
    assert!(stored.contains("***REDACTED***"));
    assert!(!stored.contains("hunter2"));
}

#[tokio::test]
async fn failing_task_records_failure() {
    let sandbox = Sandbox::new();
    let value = sandbox
        .run(
            "run-fail",
            r#"
            export async function pipeline() {
                const result = await runtime.run({
                    name: "broken",
                    image: "busybox",
                    command: ["/bin/sh", "-c", "echo oops >&2; exit 3"],
                });
                assert.equal(result.code, 3);
                assert.containsString(result.stderr, "oops");
                return result.code;
            }
            "#,
        )
        .await;
    assert_eq!(value, serde_json::json!(3));

    let row = sandbox.task_row("run-fail", "0-broken").await;
    assert_eq!(row["status"], "failure");
    assert_eq!(row["code"], 3);
}

#[tokio::test]
async fn stdin_feeds_the_task() {
    let sandbox = Sandbox::new();
    let value = sandbox
        .run(
            "run-stdin",
            r#"
            export async function pipeline() {
                const result = await runtime.run({
                    name: "cat",
                    image: "busybox",
                    command: ["cat"],
                    stdin: "from the script",
                });
                return result.stdout;
            }
            "#,
        )
        .await;
    assert_eq!(value, serde_json::json!("from the script"));
}
