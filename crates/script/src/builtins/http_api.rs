// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot `http.request()` / `http.respond(opts)`.
//!
//! When the host wires in an exchange (a request value plus a buffered
//! response channel), the script can inspect the request and answer it
//! exactly once; any respond after the first is a no-op.

use super::{object, HostState};
use crate::env::Env;
use crate::value::Value;
use std::sync::Arc;

pub fn install(env: &Env, state: &Arc<HostState>) {
    let request_state = state.clone();
    let request = Value::native("http.request", move |_args| {
        let state = request_state.clone();
        Box::pin(async move {
            let http = state.http.lock();
            Ok(http
                .request
                .as_ref()
                .map(Value::from_json)
                .unwrap_or(Value::Null))
        })
    });

    let respond_state = state.clone();
    let respond = Value::native("http.respond", move |args| {
        let state = respond_state.clone();
        Box::pin(async move {
            let opts = args.first().cloned().unwrap_or(Value::Undefined).to_json();
            let sender = {
                let mut http = state.http.lock();
                if http.responded {
                    tracing::debug!("http.respond called again, ignoring");
                    return Ok(Value::Bool(false));
                }
                http.responded = true;
                http.responder.take()
            };
            match sender {
                Some(sender) => {
                    // Buffered channel: the send never blocks the VM.
                    let _ = sender.try_send(opts);
                    Ok(Value::Bool(true))
                }
                None => Ok(Value::Bool(false)),
            }
        })
    });

    env.declare("http", object(vec![("request", request), ("respond", respond)]), true);
}
