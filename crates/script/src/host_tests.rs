// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::fake::FakeBackend;
use std::time::Duration;

fn host(backend: Arc<FakeBackend>) -> ScriptHost {
    ScriptHost::new(backend, CancellationToken::new())
}

#[tokio::test]
async fn runs_a_hello_world_pipeline() {
    let backend = FakeBackend::new();
    backend.on_task("hello", FakeBackend::ok("Hello, World!\n"));

    let result = host(backend.clone())
        .run_pipeline(
            r#"
            export async function pipeline() {
                const result = await runtime.run({
                    name: "hello",
                    image: "busybox",
                    command: ["echo", "Hello, World!"],
                });
                assert.equal(result.code, 0);
                assert.containsString(result.stdout, "Hello, World!");
                return result.stdout;
            }
            "#,
        )
        .await
        .unwrap();

    assert!(matches!(result, Value::Str(s) if s.contains("Hello, World!")));
    assert_eq!(backend.runs.lock().len(), 1);
    assert_eq!(backend.runs.lock()[0].image, "busybox");
}

#[tokio::test]
async fn promise_all_runs_tasks_in_parallel() {
    let backend = FakeBackend::new();
    backend.on_task("a", FakeBackend::ok("A"));
    backend.on_task("b", FakeBackend::ok("B"));
    backend.delays.lock().insert("a".to_string(), Duration::from_millis(80));
    backend.delays.lock().insert("b".to_string(), Duration::from_millis(80));

    let start = std::time::Instant::now();
    let result = host(backend.clone())
        .run_pipeline(
            r#"
            export async function pipeline() {
                const [a, b] = await Promise.all([
                    runtime.run({ name: "a", image: "busybox", command: ["echo", "A"] }),
                    runtime.run({ name: "b", image: "busybox", command: ["echo", "B"] }),
                ]);
                return a.stdout + b.stdout;
            }
            "#,
        )
        .await
        .unwrap();

    assert!(matches!(&result, Value::Str(s) if s == "AB"), "{result:?}");
    assert_eq!(backend.runs.lock().len(), 2);
    // Both workers overlapped: well under the 160ms serial total.
    assert!(start.elapsed() < Duration::from_millis(150), "{:?}", start.elapsed());
}

#[tokio::test]
async fn syntax_errors_surface_before_any_run() {
    let backend = FakeBackend::new();
    let err = host(backend.clone())
        .run_pipeline("export async function pipeline() { let = }")
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::Syntax { .. }), "got {err}");
    assert!(backend.runs.lock().is_empty());
}

#[tokio::test]
async fn missing_pipeline_export_is_an_entry_error() {
    let err = host(FakeBackend::new())
        .run_pipeline("async function pipeline() { return 1; }")
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::Entry(_)), "got {err}");
}

#[tokio::test]
async fn non_async_pipeline_is_rejected() {
    let err = host(FakeBackend::new())
        .run_pipeline("export function pipeline() { return 1; }")
        .await
        .unwrap_err();
    let ScriptError::Entry(message) = err else { panic!("wrong error") };
    assert!(message.contains("async"), "{message}");
}

#[tokio::test]
async fn rejected_pipeline_surfaces_message_and_stack() {
    let err = host(FakeBackend::new())
        .run_pipeline(
            r#"
            export async function pipeline() {
                throw new Error("deliberate failure");
            }
            "#,
        )
        .await
        .unwrap_err();
    let ScriptError::Runtime { message } = err else { panic!("wrong error: {err}") };
    assert!(message.contains("deliberate failure"), "{message}");
}

#[tokio::test]
async fn assertion_failures_interrupt() {
    let err = host(FakeBackend::new())
        .run_pipeline(
            r#"
            export async function pipeline() {
                try {
                    assert.equal(1, 2);
                } catch (e) {
                    return "swallowed";
                }
            }
            "#,
        )
        .await
        .unwrap_err();
    let ScriptError::Interrupted(message) = err else { panic!("wrong error: {err}") };
    assert!(message.contains("assertion failed"), "{message}");
}

#[tokio::test]
async fn unawaited_promises_drain_before_return() {
    let backend = FakeBackend::new();
    backend.delays.lock().insert("slow".to_string(), Duration::from_millis(60));

    let h = host(backend.clone());
    h.run_pipeline(
        r#"
        export async function pipeline() {
            runtime.run({ name: "slow", image: "busybox", command: ["true"] });
            return "done";
        }
        "#,
    )
    .await
    .unwrap();

    // The worker finished even though the script never awaited it.
    assert_eq!(backend.runs.lock().len(), 1);
    assert_eq!(h.pending().count(), 0);
}

#[tokio::test]
async fn storage_round_trips_through_the_backend() {
    let backend = FakeBackend::new();
    let result = host(backend.clone())
        .run_pipeline(
            r#"
            export async function pipeline() {
                await storage.set("/notes/a", { kept: true });
                const back = await storage.get("/notes/a");
                const missing = await storage.get("/notes/nope");
                return JSON.stringify(back) + "|" + String(missing);
            }
            "#,
        )
        .await
        .unwrap();
    assert!(matches!(&result, Value::Str(s) if s == r#"{"kept":true}|null"#), "{result:?}");
}

#[tokio::test]
async fn yaml_parses_and_interrupts_on_garbage() {
    let result = host(FakeBackend::new())
        .run_pipeline(
            r#"
            export async function pipeline() {
                const doc = YAML.parse("steps:\n  - name: build\n");
                return doc.steps[0].name;
            }
            "#,
        )
        .await
        .unwrap();
    assert!(matches!(&result, Value::Str(s) if s == "build"));

    let err = host(FakeBackend::new())
        .run_pipeline(
            r#"
            export async function pipeline() {
                YAML.parse("{unclosed");
            }
            "#,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::Interrupted(_)), "got {err}");
}

#[tokio::test]
async fn notify_renders_context_templates() {
    use crate::backend::Notifier;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);
    #[async_trait::async_trait]
    impl Notifier for Capture {
        async fn send(&self, message: &str, _config: &serde_json::Value) -> Result<(), String> {
            self.0.lock().push(message.to_string());
            Ok(())
        }
    }

    let capture = Arc::new(Capture::default());
    let h = ScriptHost::new(FakeBackend::new(), CancellationToken::new())
        .with_notifier(capture.clone());
    h.run_pipeline(
        r#"
        export async function pipeline() {
            notify.setContext({ job: "deploy", status: "green" });
            await notify.send("${job} finished ${status}");
        }
        "#,
    )
    .await
    .unwrap();

    assert_eq!(capture.0.lock().as_slice(), ["deploy finished green"]);
}

#[tokio::test]
async fn fetch_can_be_disabled() {
    let h = ScriptHost::new(FakeBackend::new(), CancellationToken::new()).with_fetch_config(
        FetchConfig { enabled: false, ..FetchConfig::default() },
    );
    let err = h
        .run_pipeline(
            r#"
            export async function pipeline() {
                await fetch("http://127.0.0.1:1/nope");
            }
            "#,
        )
        .await
        .unwrap_err();
    let ScriptError::Runtime { message } = err else { panic!("wrong error: {err}") };
    assert!(message.contains("disabled"), "{message}");
}

#[tokio::test]
async fn http_respond_is_one_shot() {
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let h = host(FakeBackend::new());
    h.set_http_exchange(serde_json::json!({"path": "/hook", "method": "POST"}), tx);

    let result = h
        .run_pipeline(
            r#"
            export async function pipeline() {
                const req = http.request();
                const first = http.respond({ status: 200, body: req.path });
                const second = http.respond({ status: 500 });
                return String(first) + "/" + String(second);
            }
            "#,
        )
        .await
        .unwrap();
    assert!(matches!(&result, Value::Str(s) if s == "true/false"), "{result:?}");

    let sent = rx.recv().await.unwrap();
    assert_eq!(sent, serde_json::json!({"status": 200, "body": "/hook"}));
}

#[tokio::test]
async fn cancellation_interrupts_the_pipeline() {
    let backend = FakeBackend::new();
    backend.delays.lock().insert("forever".to_string(), Duration::from_secs(600));
    let ctx = CancellationToken::new();
    let h = ScriptHost::new(backend, ctx.clone());

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        ctx.cancel();
    });

    let err = h
        .run_pipeline(
            r#"
            export async function pipeline() {
                await runtime.run({ name: "forever", image: "busybox", command: ["sleep", "600"] });
            }
            "#,
        )
        .await
        .unwrap_err();
    cancel.await.unwrap();
    assert!(matches!(err, ScriptError::Interrupted(_)), "got {err}");
}
