// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `runtime.run` and `runtime.createVolume`.
//!
//! The canonical promise bridge: each call validates its input on the VM
//! side, spawns a worker for the blocking engine call, and hands back a
//! promise the worker settles. The pending-tasks guard keeps the host from
//! tearing down the driver while a worker is still in flight — even when
//! the script never awaits the promise.

use super::{object, HostState};
use crate::env::Env;
use crate::promise::Promise;
use crate::value::Value;
use kiln_core::{RunInput, VolumeInput};
use std::sync::Arc;

pub fn install(env: &Env, state: &Arc<HostState>) {
    let run_state = state.clone();
    let run = Value::native("runtime.run", move |args| {
        let state = run_state.clone();
        Box::pin(async move {
            let input = args.first().cloned().unwrap_or(Value::Undefined);
            let input: RunInput = serde_json::from_value(input.to_json())
                .map_err(|e| Value::error(format!("invalid run input: {}", e)))?;
            if input.name.is_empty() {
                return Err(Value::error("run input requires a name"));
            }

            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            let ctx = state.ctx.clone();
            tokio::spawn(async move {
                let _guard = guard;
                match state.backend.run_task(&ctx, input).await {
                    Ok(result) => match serde_json::to_value(&result) {
                        Ok(json) => settle.resolve(Value::from_json(&json)),
                        Err(e) => settle.reject(Value::error(format!(
                            "run result encode failed: {}",
                            e
                        ))),
                    },
                    Err(message) => settle.reject(Value::error(message)),
                }
            });
            Ok(Value::Promise(promise))
        })
    });

    let volume_state = state.clone();
    let create_volume = Value::native("runtime.createVolume", move |args| {
        let state = volume_state.clone();
        Box::pin(async move {
            let input = match args.first() {
                Some(value) if !matches!(value, Value::Undefined) => {
                    serde_json::from_value::<VolumeInput>(value.to_json())
                        .map_err(|e| Value::error(format!("invalid volume input: {}", e)))?
                }
                _ => VolumeInput::default(),
            };

            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            let ctx = state.ctx.clone();
            tokio::spawn(async move {
                let _guard = guard;
                match state.backend.create_volume(&ctx, input).await {
                    Ok(result) => settle.resolve(object(vec![(
                        "name",
                        Value::string(result.name),
                    )])),
                    Err(message) => settle.reject(Value::error(message)),
                }
            });
            Ok(Value::Promise(promise))
        })
    });

    env.declare("runtime", object(vec![("run", run), ("createVolume", create_volume)]), true);
}
