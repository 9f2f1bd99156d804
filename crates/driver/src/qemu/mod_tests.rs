// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::dsn::DriverParams;

fn driver(params: DriverParams) -> QemuDriver {
    QemuDriver::new(DriverInit { namespace: "vmtest".to_string(), params }).unwrap()
}

#[test]
fn params_have_sane_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let d = driver(DriverParams::from_pairs([(
        "cache_dir",
        dir.path().to_string_lossy().to_string(),
    )]));
    assert_eq!(d.memory_mb, 2048);
    assert_eq!(d.cpus, 2);
    assert_eq!(d.accel, "kvm");
    assert!(d.image.is_none());
}

#[test]
fn params_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let d = driver(DriverParams::from_pairs([
        ("cache_dir", dir.path().to_string_lossy().to_string()),
        ("memory", "4096".to_string()),
        ("cpus", "8".to_string()),
        ("accel", "hvf".to_string()),
        ("image", "/images/guest.qcow2".to_string()),
    ]));
    assert_eq!(d.memory_mb, 4096);
    assert_eq!(d.cpus, 8);
    assert_eq!(d.accel, "hvf");
    assert_eq!(d.image.as_deref(), Some("/images/guest.qcow2"));
}

#[tokio::test]
async fn boot_without_image_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let d = driver(DriverParams::from_pairs([(
        "cache_dir",
        dir.path().to_string_lossy().to_string(),
    )]));
    let ctx = CancellationToken::new();
    let err = match d.guest(&ctx).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert!(matches!(err, DriverError::Config(_)), "got {err}");
}

#[test]
fn guest_volume_paths_are_under_the_share() {
    assert_eq!(QemuDriver::volume_guest_dir("Build Cache"), "/mnt/kiln/volumes/build-cache");
}

#[tokio::test]
async fn volumes_live_in_the_share_dir() {
    let dir = tempfile::tempdir().unwrap();
    let d = driver(DriverParams::from_pairs([(
        "cache_dir",
        dir.path().to_string_lossy().to_string(),
    )]));
    let ctx = CancellationToken::new();
    let v = d.create_volume(&ctx, "cache", 0).await.unwrap();
    let path = v.path().unwrap();
    assert!(path.starts_with(dir.path()));
    assert!(path.ends_with("share/volumes/cache"));
    assert!(path.is_dir());
}

#[tokio::test]
async fn get_container_unknown_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let d = driver(DriverParams::from_pairs([(
        "cache_dir",
        dir.path().to_string_lossy().to_string(),
    )]));
    let ctx = CancellationToken::new();
    let err = match d.get_container(&ctx, "nope").await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert!(err.is_not_found());
}
