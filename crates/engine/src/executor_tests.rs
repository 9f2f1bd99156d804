// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kiln_driver::fake::{FakeDriver, FakeOutcome};
use kiln_driver::Driver;
use kiln_storage::MemoryStateStore;
use parking_lot::Mutex;

/// Registry whose `fake` driver hands out a shared, pre-programmed
/// FakeDriver so the test can inspect calls after the run.
fn fake_registry(driver: Arc<FakeDriver>) -> Arc<DriverRegistry> {
    let registry = Arc::new(DriverRegistry::new());
    let shared = Mutex::new(Some(driver));
    registry.register("fake", move |_init| {
        let driver = shared.lock().take();
        Box::pin(async move {
            driver
                .map(|d| d as Arc<dyn Driver>)
                .ok_or_else(|| DriverError::Config("fake driver already taken".to_string()))
        })
    });
    registry
}

#[tokio::test]
async fn runs_a_pipeline_end_to_end() {
    let driver = Arc::new(FakeDriver::new("ns"));
    driver.on_task("hello", FakeOutcome::success("Hello, World!\n"));
    let store = Arc::new(MemoryStateStore::new());

    let executor = Executor::with_registry(fake_registry(driver.clone()));
    let report = executor
        .run(
            ExecutorConfig::new("fake").run_id("run-e2e").state_store(store.clone()),
            r#"
            export async function pipeline() {
                const result = await runtime.run({
                    name: "hello",
                    image: "busybox",
                    command: ["echo", "Hello, World!"],
                });
                return result.code;
            }
            "#,
        )
        .await
        .unwrap();

    assert_eq!(report.run_id.as_str(), "run-e2e");
    assert_eq!(report.value, serde_json::json!(0));
    assert!(driver.is_closed());

    let row = store
        .get(&kiln_storage::keys::task_status_key("run-e2e", "0-hello"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["status"], "success");
}

#[tokio::test]
async fn script_failures_still_close_the_driver() {
    let driver = Arc::new(FakeDriver::new("ns"));
    let executor = Executor::with_registry(fake_registry(driver.clone()));
    let err = executor
        .run(
            ExecutorConfig::new("fake"),
            r#"
            export async function pipeline() {
                throw new Error("exploded");
            }
            "#,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Script(_)), "got {err}");
    assert!(driver.is_closed());
}

#[tokio::test]
async fn unknown_driver_is_fatal() {
    let executor = Executor::with_registry(Arc::new(DriverRegistry::new()));
    let err = executor
        .run(ExecutorConfig::new("missing"), "export async function pipeline() {}")
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Driver(DriverError::Config(_))), "got {err}");
}

#[tokio::test]
async fn volumes_are_cleaned_up_on_teardown() {
    let driver = Arc::new(FakeDriver::new("ns"));
    let executor = Executor::with_registry(fake_registry(driver.clone()));
    executor
        .run(
            ExecutorConfig::new("fake"),
            r#"
            export async function pipeline() {
                await runtime.createVolume({ name: "scratch" });
            }
            "#,
        )
        .await
        .unwrap();

    use kiln_driver::fake::FakeCall;
    let calls = driver.calls();
    assert!(calls.contains(&FakeCall::CreateVolume { name: "scratch".to_string() }));
    assert_eq!(*calls.last().unwrap(), FakeCall::Close);
}

#[tokio::test]
async fn resume_executes_only_new_steps() {
    let store = Arc::new(MemoryStateStore::new());

    let first = Arc::new(FakeDriver::new("ns"));
    first.on_task("s1", FakeOutcome::success("one"));
    Executor::with_registry(fake_registry(first.clone()))
        .run(
            ExecutorConfig::new("fake")
                .run_id("run-resume")
                .resume(true)
                .state_store(store.clone()),
            r#"
            export async function pipeline() {
                await runtime.run({ name: "s1", image: "busybox", command: ["true"] });
            }
            "#,
        )
        .await
        .unwrap();
    assert_eq!(first.run_count(), 1);

    // Second attempt with an extended script: s1 skips, s2 runs.
    let second = Arc::new(FakeDriver::new("ns"));
    second.on_task("s2", FakeOutcome::success("two"));
    Executor::with_registry(fake_registry(second.clone()))
        .run(
            ExecutorConfig::new("fake")
                .run_id("run-resume")
                .resume(true)
                .state_store(store.clone()),
            r#"
            export async function pipeline() {
                await runtime.run({ name: "s1", image: "busybox", command: ["true"] });
                await runtime.run({ name: "s2", image: "busybox", command: ["true"] });
            }
            "#,
        )
        .await
        .unwrap();

    // Only the new step hit the second driver.
    assert_eq!(second.run_count(), 1);
}

#[tokio::test]
async fn overall_timeout_aborts_the_run() {
    let driver = Arc::new(FakeDriver::new("ns"));
    driver.on_task("stuck", FakeOutcome::hung());
    let executor = Executor::with_registry(fake_registry(driver));
    let err = executor
        .run(
            ExecutorConfig::new("fake").timeout(std::time::Duration::from_millis(100)),
            r#"
            export async function pipeline() {
                await runtime.run({ name: "stuck", image: "busybox", command: ["sleep", "600"] });
            }
            "#,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Script(ScriptError::Interrupted(_))), "got {err}");
}
