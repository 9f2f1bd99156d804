// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::FakeDriver;

#[tokio::test]
async fn unknown_name_is_a_config_error() {
    let registry = DriverRegistry::new();
    let dsn = Dsn::parse("nope").unwrap();
    let err = match registry.build(&dsn, "ns").await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert!(matches!(err, DriverError::Config(_)), "got {err}");
}

#[tokio::test]
async fn builds_registered_driver_with_dsn_namespace() {
    let registry = DriverRegistry::new();
    registry.register("fake", |init| {
        Box::pin(async move {
            Ok(Arc::new(FakeDriver::new(&init.namespace)) as Arc<dyn Driver>)
        })
    });

    let dsn = Dsn::parse("fake://builds").unwrap();
    let driver = registry.build(&dsn, "fallback").await.unwrap();
    assert_eq!(driver.namespace(), "builds");
}

#[tokio::test]
async fn falls_back_to_default_namespace() {
    let registry = DriverRegistry::new();
    registry.register("fake", |init| {
        Box::pin(async move {
            Ok(Arc::new(FakeDriver::new(&init.namespace)) as Arc<dyn Driver>)
        })
    });

    let dsn = Dsn::parse("fake").unwrap();
    let driver = registry.build(&dsn, "fallback").await.unwrap();
    assert_eq!(driver.namespace(), "fallback");
}

#[test]
fn builtin_registry_lists_all_drivers() {
    let names = DriverRegistry::builtin().names();
    assert_eq!(names, vec!["docker", "k8s", "native", "qemu"]);
}

#[test]
fn global_registry_is_shared() {
    assert_eq!(global().names(), global().names());
    assert!(global().names().contains(&"native".to_string()));
}
