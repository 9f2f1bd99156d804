// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::keys;
use serde_json::json;

async fn store() -> (tempfile::TempDir, FsStateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStateStore::new(dir.path()).await.unwrap();
    (dir, store)
}

#[tokio::test]
async fn get_missing_is_none() {
    let (_dir, store) = store().await;
    assert!(store.get("/pipeline/run-1/tasks/0-a").await.unwrap().is_none());
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let (_dir, store) = store().await;
    let key = keys::task_status_key("run-1", "0-build");
    let value = json!({"status": "success", "code": 0});
    store.put(&key, &value).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(value));
}

#[tokio::test]
async fn put_overwrites() {
    let (_dir, store) = store().await;
    store.put("k", &json!(1)).await.unwrap();
    store.put("k", &json!(2)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (_dir, store) = store().await;
    store.put("k", &json!(1)).await.unwrap();
    store.delete("k").await.unwrap();
    store.delete("k").await.unwrap();
    assert!(store.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn list_filters_by_prefix_in_key_order() {
    let (_dir, store) = store().await;
    store.put(&keys::task_status_key("run-1", "1-b"), &json!({"n": 2})).await.unwrap();
    store.put(&keys::task_status_key("run-1", "0-a"), &json!({"n": 1})).await.unwrap();
    store.put(&keys::task_status_key("run-2", "0-a"), &json!({"n": 3})).await.unwrap();
    store.put(&keys::resume_state_key("run-1"), &json!({})).await.unwrap();

    let entries = store.list(&keys::pipeline_prefix("run-1")).await.unwrap();
    let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        keys,
        vec!["/pipeline/run-1/tasks/0-a", "/pipeline/run-1/tasks/1-b"]
    );
}

#[tokio::test]
async fn keys_with_odd_characters_survive() {
    let (_dir, store) = store().await;
    let key = "/pipeline/run café/tasks/0-émile";
    store.put(key, &json!("v")).await.unwrap();
    assert_eq!(store.get(key).await.unwrap(), Some(json!("v")));
    let listed = store.list("/pipeline/run café/").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0, key);
}

#[tokio::test]
async fn empty_key_is_rejected() {
    let (_dir, store) = store().await;
    assert!(matches!(store.put("", &json!(1)).await, Err(StoreError::InvalidKey(_))));
}
