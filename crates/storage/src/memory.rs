// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory state store for tests and throwaway runs.

use crate::{StateStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `BTreeMap`-backed store; `list` order falls out of the key ordering.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys (test helper).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("empty key".to_string()));
        }
        self.entries.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn behaves_like_a_store() {
        let store = MemoryStateStore::new();
        store.put("/a/1", &json!(1)).await.unwrap();
        store.put("/a/2", &json!(2)).await.unwrap();
        store.put("/b/1", &json!(3)).await.unwrap();

        assert_eq!(store.get("/a/1").await.unwrap(), Some(json!(1)));
        assert!(store.get("/c").await.unwrap().is_none());

        let listed = store.list("/a/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "/a/1");

        store.delete("/a/1").await.unwrap();
        store.delete("/a/1").await.unwrap();
        assert_eq!(store.len(), 2);
    }
}
