// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fetch(url, opts?)` — bounded HTTP for pipeline scripts.
//!
//! Per-call timeout (default 30 s) and a hard cap on response size
//! (default 10 MiB, enforced while streaming). The body is read eagerly
//! so `text()` and `json()` on the response object are cheap resolved
//! promises. Hosts can disable the whole surface at construction.

use super::{object, HostState};
use crate::env::Env;
use crate::promise::Promise;
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;

pub fn install(env: &Env, state: &Arc<HostState>) {
    let fetch_state = state.clone();
    let fetch = Value::native("fetch", move |args| {
        let state = fetch_state.clone();
        Box::pin(async move {
            if !state.fetch.enabled {
                return Err(Value::error("fetch is disabled for this pipeline"));
            }
            let Some(Value::Str(url)) = args.first() else {
                return Err(Value::error("fetch expects a url string"));
            };
            let url = url.clone();
            let opts = args.get(1).cloned().unwrap_or(Value::Undefined).to_json();

            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            let config = state.fetch.clone();
            tokio::spawn(async move {
                let _guard = guard;
                match perform(&url, &opts, &config).await {
                    Ok(response) => settle.resolve(response),
                    Err(message) => settle.reject(Value::error(message)),
                }
            });
            Ok(Value::Promise(promise))
        })
    });

    env.declare("fetch", fetch, true);
}

async fn perform(
    url: &str,
    opts: &serde_json::Value,
    config: &super::FetchConfig,
) -> Result<Value, String> {
    let timeout = opts
        .get("timeout")
        .and_then(|t| t.as_u64())
        .map(Duration::from_millis)
        .unwrap_or(config.default_timeout);
    let method = opts.get("method").and_then(|m| m.as_str()).unwrap_or("GET").to_uppercase();

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("fetch client: {}", e))?;

    let method: reqwest::Method =
        method.parse().map_err(|_| format!("invalid method {:?}", method))?;
    let mut request = client.request(method, url);
    if let Some(headers) = opts.get("headers").and_then(|h| h.as_object()) {
        for (key, value) in headers {
            if let Some(value) = value.as_str() {
                request = request.header(key, value);
            }
        }
    }
    if let Some(body) = opts.get("body") {
        request = match body {
            serde_json::Value::String(s) => request.body(s.clone()),
            other => request.json(other),
        };
    }

    let response = request.send().await.map_err(|e| format!("fetch {}: {}", url, e))?;
    let status = response.status();
    let mut headers = indexmap::IndexMap::new();
    for (key, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(key.to_string(), Value::string(value));
        }
    }

    // Stream the body, refusing to buffer past the cap.
    let mut body = Vec::new();
    let mut response = response;
    while let Some(chunk) =
        response.chunk().await.map_err(|e| format!("fetch body: {}", e))?
    {
        if body.len() + chunk.len() > config.max_response_bytes {
            return Err(format!(
                "response exceeds the {} byte limit",
                config.max_response_bytes
            ));
        }
        body.extend_from_slice(&chunk);
    }
    let body = String::from_utf8_lossy(&body).into_owned();

    let text_body = body.clone();
    let text = Value::native("text", move |_args| {
        let body = text_body.clone();
        Box::pin(async move { Ok(Value::Promise(Promise::resolved(Value::string(body)))) })
    });
    let json_body = body;
    let json = Value::native("json", move |_args| {
        let body = json_body.clone();
        Box::pin(async move {
            let parsed: serde_json::Value = serde_json::from_str(&body)
                .map_err(|e| Value::error(format!("response is not JSON: {}", e)))?;
            Ok(Value::Promise(Promise::resolved(Value::from_json(&parsed))))
        })
    });

    Ok(object(vec![
        ("status", Value::Number(f64::from(status.as_u16()))),
        (
            "statusText",
            Value::string(status.canonical_reason().unwrap_or_default()),
        ),
        ("ok", Value::Bool(status.is_success())),
        ("headers", Value::object(headers)),
        ("text", text),
        ("json", json),
    ]))
}
