// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{DirStreamer, FsCacheStore};
use std::sync::atomic::AtomicUsize;

/// Host-directory volume that counts cleanups.
struct DirVolume {
    name: String,
    dir: PathBuf,
    cleanups: AtomicUsize,
}

#[async_trait]
impl Volume for DirVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn volume(dir: &std::path::Path) -> Arc<DirVolume> {
    Arc::new(DirVolume {
        name: "v".to_string(),
        dir: dir.to_path_buf(),
        cleanups: AtomicUsize::new(0),
    })
}

fn cached(
    inner: Arc<DirVolume>,
    store: Arc<FsCacheStore>,
    compression: Compression,
) -> CachedVolume {
    CachedVolume::new(inner, Arc::new(DirStreamer), store, compression, "deadbeef00112233")
}

#[test]
fn cache_keys_are_deterministic_and_truncated() {
    let a = cache_key("ns", "run-1", "0-build", "build");
    let b = cache_key("ns", "run-1", "0-build", "build");
    assert_eq!(a, b);
    assert_eq!(a.len(), 16);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

    assert_ne!(a, cache_key("ns", "run-2", "0-build", "build"));
}

#[test]
fn extension_lands_in_the_store_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsCacheStore::new(dir.path().join("cache")).unwrap());
    let v = cached(volume(&dir.path().join("vol")), store, Compression::Zstd);
    assert_eq!(v.key(), "deadbeef00112233.zst");
}

#[tokio::test]
async fn persist_then_restore_to_fresh_volume_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsCacheStore::new(dir.path().join("cache")).unwrap());
    let ctx = CancellationToken::new();

    let src_dir = dir.path().join("src");
    std::fs::create_dir_all(src_dir.join("sub")).unwrap();
    std::fs::write(src_dir.join("artifact"), b"binary stuff").unwrap();
    std::fs::write(src_dir.join("sub/more"), b"nested").unwrap();
    let src = cached(volume(&src_dir), store.clone(), Compression::Zstd);
    src.persist_to_cache(&ctx).await.unwrap();

    let dst_dir = dir.path().join("dst");
    std::fs::create_dir_all(&dst_dir).unwrap();
    let dst = cached(volume(&dst_dir), store, Compression::Zstd);
    dst.restore_from_cache(&ctx).await;

    assert_eq!(std::fs::read(dst_dir.join("artifact")).unwrap(), b"binary stuff");
    assert_eq!(std::fs::read(dst_dir.join("sub/more")).unwrap(), b"nested");
}

#[tokio::test]
async fn restore_is_single_shot() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsCacheStore::new(dir.path().join("cache")).unwrap());
    let ctx = CancellationToken::new();

    let src_dir = dir.path().join("src");
    std::fs::create_dir_all(&src_dir).unwrap();
    std::fs::write(src_dir.join("f"), b"one").unwrap();
    let src = cached(volume(&src_dir), store.clone(), Compression::None);
    src.persist_to_cache(&ctx).await.unwrap();

    let dst_dir = dir.path().join("dst");
    std::fs::create_dir_all(&dst_dir).unwrap();
    let dst = cached(volume(&dst_dir), store.clone(), Compression::None);
    dst.restore_from_cache(&ctx).await;
    assert_eq!(std::fs::read(dst_dir.join("f")).unwrap(), b"one");

    // Change the cached entry; a second restore must not pick it up.
    std::fs::write(src_dir.join("f"), b"two").unwrap();
    src.persist_to_cache(&ctx).await.unwrap();
    dst.restore_from_cache(&ctx).await;
    assert_eq!(std::fs::read(dst_dir.join("f")).unwrap(), b"one");
}

#[tokio::test]
async fn cache_miss_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsCacheStore::new(dir.path().join("cache")).unwrap());
    let ctx = CancellationToken::new();

    let vol_dir = dir.path().join("vol");
    std::fs::create_dir_all(&vol_dir).unwrap();
    let v = cached(volume(&vol_dir), store, Compression::Zstd);
    v.restore_from_cache(&ctx).await;
    assert_eq!(std::fs::read_dir(&vol_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn cleanup_persists_first_then_delegates() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsCacheStore::new(dir.path().join("cache")).unwrap());
    let ctx = CancellationToken::new();

    let vol_dir = dir.path().join("vol");
    std::fs::create_dir_all(&vol_dir).unwrap();
    std::fs::write(vol_dir.join("f"), b"data").unwrap();
    let inner = volume(&vol_dir);
    let v = cached(inner.clone(), store.clone(), Compression::Zstd);

    v.cleanup(&ctx).await.unwrap();
    assert_eq!(inner.cleanups.load(Ordering::SeqCst), 1);
    assert!(store.exists(v.key()).await.unwrap());
}

#[tokio::test]
async fn persist_failure_does_not_block_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsCacheStore::new(dir.path().join("cache")).unwrap());
    let ctx = CancellationToken::new();

    // Pathless inner volume: persist will fail with NoHostPath.
    struct Pathless(AtomicUsize);
    #[async_trait]
    impl Volume for Pathless {
        fn name(&self) -> &str {
            "pvc"
        }
        fn path(&self) -> Option<PathBuf> {
            None
        }
        async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
    let inner = Arc::new(Pathless(AtomicUsize::new(0)));
    let v = CachedVolume::new(inner.clone(), Arc::new(DirStreamer), store, Compression::Zstd, "k");
    v.cleanup(&ctx).await.unwrap();
    assert_eq!(inner.0.load(Ordering::SeqCst), 1);
}
