// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume specs: interrupted runs skip completed steps.

use super::prelude::Sandbox;
use kiln_engine::Executor;
use kiln_storage::StateStore;

/// Steps append to a shared scratch file so re-execution is observable.
fn step_script(steps: &[&str], marker_dir: &str) -> String {
    let mut body = String::new();
    for step in steps {
        body.push_str(&format!(
            r#"await runtime.run({{
                name: "{step}",
                image: "busybox",
                command: ["/bin/sh", "-c", "echo {step} >> {marker_dir}/ran"],
            }});
            "#,
        ));
    }
    format!("export async function pipeline() {{ {} }}", body)
}

async fn ran_steps(marker_dir: &std::path::Path) -> Vec<String> {
    match tokio::fs::read_to_string(marker_dir.join("ran")).await {
        Ok(text) => text.split_whitespace().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn second_run_skips_completed_steps() {
    let sandbox = Sandbox::new();
    let marker = tempfile::tempdir().unwrap();
    let marker_dir = marker.path().to_string_lossy().to_string();

    // First run: s1 and s2 execute.
    Executor::new()
        .run(
            sandbox.config("run-skip").resume(true),
            &step_script(&["s1", "s2"], &marker_dir),
        )
        .await
        .unwrap();
    assert_eq!(ran_steps(marker.path()).await, vec!["s1", "s2"]);

    // Second run with the same ID and a third step: only s3 executes.
    Executor::new()
        .run(
            sandbox.config("run-skip").resume(true),
            &step_script(&["s1", "s2", "s3"], &marker_dir),
        )
        .await
        .unwrap();
    assert_eq!(ran_steps(marker.path()).await, vec!["s1", "s2", "s3"]);

    // Final state: three completed steps, in order.
    let state = sandbox
        .store
        .get(&kiln_storage::keys::resume_state_key("run-skip"))
        .await
        .unwrap()
        .unwrap();
    let state: kiln_core::PipelineState = serde_json::from_value(state).unwrap();
    assert_eq!(state.step_order, vec!["0-s1", "1-s2", "2-s3"]);
    assert!(state
        .ordered_steps()
        .all(|s| s.status == kiln_core::StepStatus::Completed));
    assert!(state.completed_at.is_some());
}

#[tokio::test]
async fn without_resume_everything_reruns() {
    let sandbox = Sandbox::new();
    let marker = tempfile::tempdir().unwrap();
    let marker_dir = marker.path().to_string_lossy().to_string();
    let script = step_script(&["s1"], &marker_dir);

    Executor::new().run(sandbox.config("run-rerun"), &script).await.unwrap();
    Executor::new().run(sandbox.config("run-rerun"), &script).await.unwrap();

    assert_eq!(ran_steps(marker.path()).await, vec!["s1", "s1"]);
}

#[tokio::test]
async fn skipped_steps_return_their_cached_result() {
    let sandbox = Sandbox::new();

    let script = r#"
        export async function pipeline() {
            const result = await runtime.run({
                name: "stamp",
                image: "busybox",
                command: ["/bin/sh", "-c", "date +%s%N"],
            });
            return result.stdout;
        }
    "#;

    let first = Executor::new()
        .run(sandbox.config("run-cached").resume(true), script)
        .await
        .unwrap();
    let second = Executor::new()
        .run(sandbox.config("run-cached").resume(true), script)
        .await
        .unwrap();

    // The second run never re-executed: it returned the recorded output.
    assert_eq!(first.value, second.value);
}
