// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed state store.
//!
//! One file per key under a single root directory. Keys are escaped into
//! filenames (percent-encoding everything outside `[A-Za-z0-9._-]`), which
//! keeps get/put/delete exact and makes `list` a directory scan — no
//! guessing about which path separators belonged to the key. Writes go
//! through a temp file and rename so readers never observe a torn value.

use crate::{StateStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

const VALUE_EXT: &str = ".json";

/// State store persisting each key as a JSON file under `root`.
#[derive(Debug, Clone)]
pub struct FsStateStore {
    root: PathBuf,
}

impl FsStateStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Io { key: root.display().to_string(), source: e })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("empty key".to_string()));
        }
        Ok(self.root.join(format!("{}{}", escape_key(key), VALUE_EXT)))
    }
}

#[async_trait]
impl StateStore for FsStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.file_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io { key: key.to_string(), source: e }),
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt { key: key.to_string(), source: e })?;
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.file_for(key)?;
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::Corrupt { key: key.to_string(), source: e })?;

        // Write-then-rename so a crash mid-write leaves the old value intact.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Io { key: key.to_string(), source: e })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Io { key: key.to_string(), source: e })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.file_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io { key: key.to_string(), source: e }),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io { key: prefix.to_string(), source: e }),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::Io { key: prefix.to_string(), source: e })?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(VALUE_EXT) else { continue };
            let key = unescape_key(stem);
            if !key.starts_with(prefix) {
                continue;
            }
            let bytes = tokio::fs::read(entry.path())
                .await
                .map_err(|e| StoreError::Io { key: key.clone(), source: e })?;
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt { key: key.clone(), source: e })?;
            entries.push((key, value));
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn unescape_key(escaped: &str) -> String {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (hex_val(bytes.get(i + 1)), hex_val(bytes.get(i + 2))) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: Option<&u8>) -> Option<u8> {
    match b? {
        c @ b'0'..=b'9' => Some(c - b'0'),
        c @ b'A'..=b'F' => Some(c - b'A' + 10),
        c @ b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
