// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification API: template rendering plus delivery through the
//! [`Notifier`](crate::backend::Notifier) seam.
//!
//! Messages interpolate `${name}` placeholders from the context set via
//! `notify.setContext`; unknown placeholders stay as-is so a half-filled
//! context degrades visibly instead of silently.

use super::{object, HostState};
use crate::env::Env;
use crate::promise::Promise;
use crate::value::Value;
use regex::Regex;
use std::sync::{Arc, LazyLock};

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_.]*)\}").expect("constant regex pattern is valid")
});

/// Interpolate `${name}` placeholders from the context map.
pub(crate) fn interpolate(
    template: &str,
    context: &serde_json::Map<String, serde_json::Value>,
) -> String {
    VAR_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match context.get(name) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn as_object(value: &Value) -> serde_json::Map<String, serde_json::Value> {
    match value.to_json() {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// Extract `(message, config)` from a send argument: either a bare string
/// or `{message, config}`.
fn send_parts(
    state: &HostState,
    arg: &Value,
) -> Result<(String, serde_json::Value), String> {
    let notify = state.notify.lock();
    let (template, config_name) = match arg {
        Value::Str(message) => (message.clone(), None),
        Value::Object(map) => {
            let map = map.lock();
            let message = match map.get("message") {
                Some(Value::Str(s)) => s.clone(),
                _ => return Err("notify.send requires a message".to_string()),
            };
            let config = match map.get("config") {
                Some(Value::Str(name)) => Some(name.clone()),
                _ => None,
            };
            (message, config)
        }
        _ => return Err("notify.send expects a message or options object".to_string()),
    };
    let rendered = interpolate(&template, &notify.context);
    let config = match config_name {
        Some(name) => notify
            .configs
            .get(&name)
            .cloned()
            .ok_or_else(|| format!("unknown notify config {:?}", name))?,
        None => serde_json::Value::Null,
    };
    Ok((rendered, config))
}

pub fn install(env: &Env, state: &Arc<HostState>) {
    let send_state = state.clone();
    let send = Value::native("notify.send", move |args| {
        let state = send_state.clone();
        Box::pin(async move {
            let arg = args.first().cloned().unwrap_or(Value::Undefined);
            let (message, config) = send_parts(&state, &arg).map_err(Value::error)?;

            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            let notifier = state.notifier.clone();
            tokio::spawn(async move {
                let _guard = guard;
                match notifier.send(&message, &config).await {
                    Ok(()) => settle.resolve(Value::Undefined),
                    Err(e) => settle.reject(Value::error(e)),
                }
            });
            Ok(Value::Promise(promise))
        })
    });

    let multi_state = state.clone();
    let send_multiple = Value::native("notify.sendMultiple", move |args| {
        let state = multi_state.clone();
        Box::pin(async move {
            let Some(Value::Array(items)) = args.first() else {
                return Err(Value::error("notify.sendMultiple expects an array"));
            };
            let mut prepared = Vec::new();
            for item in items.lock().iter() {
                prepared.push(send_parts(&state, item).map_err(Value::error)?);
            }

            let promise = Promise::new();
            let settle = promise.clone();
            let guard = state.pending.track();
            let notifier = state.notifier.clone();
            tokio::spawn(async move {
                let _guard = guard;
                for (message, config) in prepared {
                    if let Err(e) = notifier.send(&message, &config).await {
                        settle.reject(Value::error(e));
                        return;
                    }
                }
                settle.resolve(Value::Undefined);
            });
            Ok(Value::Promise(promise))
        })
    });

    let configs_state = state.clone();
    let set_configs = Value::native("notify.setConfigs", move |args| {
        let state = configs_state.clone();
        Box::pin(async move {
            let configs = as_object(&args.first().cloned().unwrap_or(Value::Undefined));
            state.notify.lock().configs = configs;
            Ok(Value::Undefined)
        })
    });

    let context_state = state.clone();
    let set_context = Value::native("notify.setContext", move |args| {
        let state = context_state.clone();
        Box::pin(async move {
            let context = as_object(&args.first().cloned().unwrap_or(Value::Undefined));
            state.notify.lock().context = context;
            Ok(Value::Undefined)
        })
    });

    env.declare(
        "notify",
        object(vec![
            ("send", send),
            ("sendMultiple", send_multiple),
            ("setConfigs", set_configs),
            ("setContext", set_context),
        ]),
        true,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn interpolates_known_names() {
        let ctx = context(&[("job", "build"), ("status", "green")]);
        assert_eq!(
            interpolate("${job} is ${status}", &ctx),
            "build is green"
        );
    }

    #[test]
    fn unknown_names_stay_literal() {
        let ctx = context(&[]);
        assert_eq!(interpolate("missing ${nope}", &ctx), "missing ${nope}");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let mut ctx = serde_json::Map::new();
        ctx.insert("count".to_string(), serde_json::json!(3));
        assert_eq!(interpolate("n=${count}", &ctx), "n=3");
    }
}
