// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `storage.*` — state store passthrough for pipeline scripts.

use super::{object, HostState};
use crate::promise::Promise;
use crate::value::Value;
use crate::env::Env;
use std::sync::Arc;

fn key_arg(args: &[Value], what: &str) -> Result<String, Value> {
    match args.first() {
        Some(Value::Str(key)) if !key.is_empty() => Ok(key.clone()),
        _ => Err(Value::error(format!("{} expects a key string", what))),
    }
}

pub fn install(env: &Env, state: &Arc<HostState>) {
    let get_state = state.clone();
    let get = Value::native("storage.get", move |args| {
        let state = get_state.clone();
        Box::pin(async move {
            let key = key_arg(&args, "storage.get")?;
            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            tokio::spawn(async move {
                let _guard = guard;
                match state.backend.storage_get(&key).await {
                    Ok(Some(value)) => settle.resolve(Value::from_json(&value)),
                    Ok(None) => settle.resolve(Value::Null),
                    Err(e) => settle.reject(Value::error(e)),
                }
            });
            Ok(Value::Promise(promise))
        })
    });

    let set_state = state.clone();
    let set = Value::native("storage.set", move |args| {
        let state = set_state.clone();
        Box::pin(async move {
            let key = key_arg(&args, "storage.set")?;
            let value = args.get(1).cloned().unwrap_or(Value::Null).to_json();
            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            tokio::spawn(async move {
                let _guard = guard;
                match state.backend.storage_set(&key, value).await {
                    Ok(()) => settle.resolve(Value::Undefined),
                    Err(e) => settle.reject(Value::error(e)),
                }
            });
            Ok(Value::Promise(promise))
        })
    });

    let delete_state = state.clone();
    let delete = Value::native("storage.delete", move |args| {
        let state = delete_state.clone();
        Box::pin(async move {
            let key = key_arg(&args, "storage.delete")?;
            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            tokio::spawn(async move {
                let _guard = guard;
                match state.backend.storage_delete(&key).await {
                    Ok(()) => settle.resolve(Value::Undefined),
                    Err(e) => settle.reject(Value::error(e)),
                }
            });
            Ok(Value::Promise(promise))
        })
    });

    let list_state = state.clone();
    let list = Value::native("storage.list", move |args| {
        let state = list_state.clone();
        Box::pin(async move {
            let prefix = match args.first() {
                Some(Value::Str(prefix)) => prefix.clone(),
                _ => String::new(),
            };
            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            tokio::spawn(async move {
                let _guard = guard;
                match state.backend.storage_list(&prefix).await {
                    Ok(entries) => {
                        let mut map = indexmap::IndexMap::new();
                        for (key, value) in entries {
                            map.insert(key, Value::from_json(&value));
                        }
                        settle.resolve(Value::object(map));
                    }
                    Err(e) => settle.reject(Value::error(e)),
                }
            });
            Ok(Value::Promise(promise))
        })
    });

    env.declare(
        "storage",
        object(vec![("get", get), ("set", set), ("delete", delete), ("list", list)]),
        true,
    );
}
