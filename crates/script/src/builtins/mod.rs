// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The runtime API exposed to pipeline scripts.
//!
//! # Module layout
//!
//! - [`runtime_api`] — `runtime.run` / `runtime.createVolume`
//! - [`assert`] — `assert.*` (failures interrupt the VM)
//! - [`yaml`] — `YAML.parse` / `YAML.stringify`
//! - [`fetch`] — bounded HTTP client
//! - [`notify`] — notification templating and delivery
//! - [`http_api`] — one-shot `http.request()` / `http.respond()`
//! - [`storage_api`] — state store passthrough
//! - [`globals`] — `Promise`, `JSON`, `Object`, `Math`, `console`, `Error`
//!
//! Every blocking operation follows the same bridge: create a promise,
//! take a pending-tasks guard, spawn a worker, settle the promise from the
//! worker. Promises are only ever consumed on the interpreter task.

pub mod assert;
pub mod fetch;
pub mod globals;
pub mod http_api;
pub mod notify;
pub mod runtime_api;
pub mod storage_api;
pub mod yaml;

use crate::backend::{Notifier, PipelineBackend};
use crate::env::Env;
use crate::promise::PendingTasks;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Limits and wiring for `fetch`.
#[derive(Clone)]
pub struct FetchConfig {
    pub enabled: bool,
    pub default_timeout: std::time::Duration,
    pub max_response_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_timeout: std::time::Duration::from_secs(30),
            max_response_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Mutable notification state (`setConfigs` / `setContext`).
#[derive(Default)]
pub struct NotifyState {
    pub configs: serde_json::Map<String, serde_json::Value>,
    pub context: serde_json::Map<String, serde_json::Value>,
}

/// One-shot HTTP exchange the host may wire in.
#[derive(Default)]
pub struct HttpExchange {
    pub request: Option<serde_json::Value>,
    pub responder: Option<tokio::sync::mpsc::Sender<serde_json::Value>>,
    pub responded: bool,
}

/// Everything the builtins share.
pub struct HostState {
    pub backend: Arc<dyn PipelineBackend>,
    pub pending: PendingTasks,
    pub ctx: CancellationToken,
    pub fetch: FetchConfig,
    pub notifier: Arc<dyn Notifier>,
    pub notify: Mutex<NotifyState>,
    pub http: Mutex<HttpExchange>,
}

/// Install the whole API surface into the global scope.
pub fn install(env: &Env, state: &Arc<HostState>) {
    runtime_api::install(env, state);
    assert::install(env);
    yaml::install(env);
    fetch::install(env, state);
    notify::install(env, state);
    http_api::install(env, state);
    storage_api::install(env, state);
    globals::install(env);
}

/// Helper: build an object value from (key, value) pairs.
pub(crate) fn object(pairs: Vec<(&str, Value)>) -> Value {
    let mut map = indexmap::IndexMap::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v);
    }
    Value::object(map)
}
