// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI specs for the `kiln` binary.

use assert_cmd::Command;

fn kiln() -> Command {
    Command::cargo_bin("kiln").unwrap_or_else(|e| panic!("kiln binary: {e}"))
}

#[test]
fn drivers_lists_builtins() {
    let output = kiln().arg("drivers").assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    for name in ["docker", "k8s", "native", "qemu"] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
}

#[test]
fn run_executes_a_script_with_the_native_driver() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("hello.js");
    std::fs::write(
        &script,
        r#"
        export async function pipeline() {
            const result = await runtime.run({
                name: "hello",
                image: "busybox",
                command: ["echo", "Hello, World!"],
            });
            assert.equal(result.code, 0);
        }
        "#,
    )
    .unwrap();

    kiln()
        .arg("run")
        .arg(&script)
        .arg("--driver")
        .arg(format!("native:root={}", dir.path().join("root").display()))
        .assert()
        .success()
        .stdout(predicates::str::contains("Hello, World!"));
}

#[test]
fn run_fails_on_syntax_errors() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("broken.js");
    std::fs::write(&script, "export async function pipeline() { let = }").unwrap();

    kiln()
        .arg("run")
        .arg(&script)
        .arg("--driver")
        .arg(format!("native:root={}", dir.path().join("root").display()))
        .assert()
        .failure()
        .stderr(predicates::str::contains("syntax error"));
}

#[test]
fn run_fails_on_missing_script() {
    kiln().arg("run").arg("/no/such/pipeline.js").assert().failure();
}
