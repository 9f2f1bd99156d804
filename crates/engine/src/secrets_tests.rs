// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[tokio::test]
async fn static_manager_scopes_lookups() {
    let secrets = StaticSecretsManager::new()
        .with_global("API_KEY", "global-value")
        .with_pipeline("run-1", "API_KEY", "pipeline-value");

    let pipeline =
        secrets.get(SecretScope::Pipeline("run-1".to_string()), "API_KEY").await.unwrap();
    assert_eq!(pipeline.as_deref(), Some("pipeline-value"));

    let global = secrets.get(SecretScope::Global, "API_KEY").await.unwrap();
    assert_eq!(global.as_deref(), Some("global-value"));

    let other =
        secrets.get(SecretScope::Pipeline("run-2".to_string()), "API_KEY").await.unwrap();
    assert!(other.is_none());
}

#[tokio::test]
#[serial]
async fn env_manager_reads_prefixed_vars() {
    std::env::set_var("KILN_SECRET_ENV_TEST_TOKEN", "hunter2");
    let secrets = EnvSecretsManager;
    let got = secrets.get(SecretScope::Global, "env_test_token").await.unwrap();
    assert_eq!(got.as_deref(), Some("hunter2"));
    std::env::remove_var("KILN_SECRET_ENV_TEST_TOKEN");

    let gone = secrets.get(SecretScope::Global, "env_test_token").await.unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn env_manager_never_resolves_pipeline_scope() {
    std::env::set_var("KILN_SECRET_SCOPED", "x");
    let secrets = EnvSecretsManager;
    let got =
        secrets.get(SecretScope::Pipeline("run-1".to_string()), "SCOPED").await.unwrap();
    assert!(got.is_none());
    std::env::remove_var("KILN_SECRET_SCOPED");
}
