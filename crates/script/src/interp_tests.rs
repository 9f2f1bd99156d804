// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::parser::Parser;

/// Run a source snippet and return the value of the exported-free
/// variable `out` after execution.
async fn run(source: &str) -> Eval<Value> {
    let program = Parser::parse(source).unwrap_or_else(|e| panic!("parse failed: {e}"));
    let env = Env::root();
    let interp = Interp::new(CancellationToken::new());
    interp.exec_block(&env, &program.body).await?;
    Ok(env.get("out").unwrap_or(Value::Undefined))
}

async fn run_ok(source: &str) -> Value {
    run(source).await.unwrap_or_else(|flow| panic!("script failed: {flow:?}"))
}

fn num(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        other => panic!("expected number, got {other:?}"),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => panic!("expected string, got {other:?}"),
    }
}

#[tokio::test]
async fn arithmetic_and_precedence() {
    assert_eq!(num(&run_ok("let out = 2 + 3 * 4").await), 14.0);
    assert_eq!(num(&run_ok("let out = (2 + 3) * 4").await), 20.0);
    assert_eq!(num(&run_ok("let out = 10 % 3").await), 1.0);
}

#[tokio::test]
async fn string_concat_and_templates() {
    assert_eq!(text(&run_ok(r#"let out = "a" + 1 + true"#).await), "a1true");
    assert_eq!(
        text(&run_ok(r#"let code = 3; let out = `exit ${code + 1}!`"#).await),
        "exit 4!"
    );
}

#[tokio::test]
async fn functions_and_closures() {
    let out = run_ok(
        r#"
        function counter() {
            let n = 0;
            return () => { n += 1; return n; };
        }
        const tick = counter();
        tick(); tick();
        let out = tick();
        "#,
    )
    .await;
    assert_eq!(num(&out), 3.0);
}

#[tokio::test]
async fn async_function_returns_promise() {
    let out = run_ok(
        r#"
        async function f() { return 5; }
        let out = f();
        "#,
    )
    .await;
    assert!(matches!(out, Value::Promise(_)));
}

#[tokio::test]
async fn await_unwraps_promises() {
    let out = run_ok(
        r#"
        async function f() { return 5; }
        async function main() { return (await f()) + 1; }
        let out = await main();
        "#,
    )
    .await;
    assert_eq!(num(&out), 6.0);
}

#[tokio::test]
async fn control_flow_loops() {
    let out = run_ok(
        r#"
        let total = 0;
        for (const n of [1, 2, 3, 4]) {
            if (n == 3) { continue; }
            total += n;
        }
        let i = 0;
        while (true) {
            i += 1;
            if (i >= 10) { break; }
        }
        let out = total * 100 + i;
        "#,
    )
    .await;
    assert_eq!(num(&out), 710.0);
}

#[tokio::test]
async fn destructuring_binds_by_index() {
    let out = run_ok("const [a, , c] = [1, 2, 3]; let out = a + c").await;
    assert_eq!(num(&out), 4.0);
}

#[tokio::test]
async fn objects_are_shared_references() {
    let out = run_ok(
        r#"
        const o = { count: 0 };
        const alias = o;
        alias.count = 5;
        let out = o.count;
        "#,
    )
    .await;
    assert_eq!(num(&out), 5.0);
}

#[tokio::test]
async fn array_methods() {
    let out = run_ok(
        r#"
        const xs = [1, 2, 3];
        const doubled = xs.map((x) => x * 2);
        const big = doubled.filter((x) => x > 2);
        let out = big.join("-") + ":" + xs.length + ":" + big.includes(6);
        "#,
    )
    .await;
    assert_eq!(text(&out), "4-6:3:true");
}

#[tokio::test]
async fn string_methods() {
    let out = run_ok(
        r#"
        const s = "  Hello, World  ";
        let out = s.trim().toLowerCase().replace("hello", "goodbye");
        "#,
    )
    .await;
    assert_eq!(text(&out), "goodbye, world");
}

#[tokio::test]
async fn throw_and_catch() {
    let out = run_ok(
        r#"
        let out = "";
        try {
            throw new Error("kaput");
            out = "unreachable";
        } catch (e) {
            out = "caught: " + e.message;
        } finally {
            out += " (cleaned up)";
        }
        "#,
    )
    .await;
    assert_eq!(text(&out), "caught: kaput (cleaned up)");
}

#[tokio::test]
async fn uncaught_throw_bubbles() {
    let flow = run(r#"throw new Error("loose")"#).await.unwrap_err();
    assert!(matches!(flow, Flow::Throw(_)));
}

#[tokio::test]
async fn interrupts_pass_through_catch() {
    let program = Parser::parse(
        r#"
        try { boom(); } catch (e) { swallowed = true; }
        "#,
    )
    .unwrap();
    let env = Env::root();
    env.declare(
        "boom",
        Value::native("boom", |_args| {
            Box::pin(async { Err(interrupt_value("assertion failed: nope")) })
        }),
        false,
    );
    let interp = Interp::new(CancellationToken::new());
    let flow = interp.exec_block(&env, &program.body).await.unwrap_err();
    let Flow::Interrupt(message) = flow else { panic!("expected interrupt, got {flow:?}") };
    assert!(message.contains("assertion failed"));
}

#[tokio::test]
async fn cancellation_interrupts_between_statements() {
    let program = Parser::parse("let a = 1; let b = 2;").unwrap();
    let env = Env::root();
    let ctx = CancellationToken::new();
    ctx.cancel();
    let interp = Interp::new(ctx);
    let flow = interp.exec_block(&env, &program.body).await.unwrap_err();
    assert!(matches!(flow, Flow::Interrupt(_)));
}

#[tokio::test]
async fn ternary_coalesce_logical() {
    assert_eq!(num(&run_ok("let out = true ? 1 : 2").await), 1.0);
    assert_eq!(num(&run_ok("let out = null ?? 7").await), 7.0);
    assert_eq!(num(&run_ok("let out = 0 || 9").await), 9.0);
    assert_eq!(num(&run_ok("let out = 0 ?? 9").await), 0.0);
}

#[tokio::test]
async fn spread_in_arrays_and_objects() {
    let out = run_ok(
        r#"
        const base = { a: 1, b: 2 };
        const extended = { ...base, b: 3 };
        const xs = [0, ...[1, 2]];
        let out = extended.a + extended.b + xs.length;
        "#,
    )
    .await;
    assert_eq!(num(&out), 7.0);
}

#[tokio::test]
async fn const_assignment_is_an_error() {
    let flow = run("const k = 1; k = 2;").await.unwrap_err();
    assert!(matches!(flow, Flow::Throw(_)));
}
