// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Free-standing globals: `Promise`, `JSON`, `Object`, `Math`, `console`,
//! `Error`, `String`, `Number`.

use super::object;
use crate::env::Env;
use crate::promise::Promise;
use crate::value::Value;

pub fn install(env: &Env) {
    install_promise(env);
    install_json(env);
    install_object(env);
    install_math(env);
    install_console(env);

    env.declare(
        "Error",
        Value::native("Error", |args| {
            Box::pin(async move {
                let message = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    Some(other) => other.render(),
                    None => String::new(),
                };
                Ok(Value::error(message))
            })
        }),
        true,
    );

    env.declare(
        "String",
        Value::native("String", |args| {
            Box::pin(async move {
                Ok(Value::string(
                    args.first().map(Value::render).unwrap_or_default(),
                ))
            })
        }),
        true,
    );

    env.declare(
        "Number",
        Value::native("Number", |args| {
            Box::pin(async move {
                let n = match args.first() {
                    Some(Value::Number(n)) => *n,
                    Some(Value::Str(s)) => s.trim().parse().unwrap_or(f64::NAN),
                    Some(Value::Bool(true)) => 1.0,
                    Some(Value::Bool(false)) | None => 0.0,
                    Some(_) => f64::NAN,
                };
                Ok(Value::Number(n))
            })
        }),
        true,
    );
}

fn install_promise(env: &Env) {
    let all = Value::native("Promise.all", |args| {
        Box::pin(async move {
            let Some(Value::Array(items)) = args.first() else {
                return Err(Value::error("Promise.all expects an array"));
            };
            let snapshot = items.lock().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for item in snapshot {
                out.push(settle(item).await?);
            }
            Ok(Value::Promise(Promise::resolved(Value::array(out))))
        })
    });

    let resolve = Value::native("Promise.resolve", |args| {
        Box::pin(async move {
            Ok(Value::Promise(Promise::resolved(
                args.first().cloned().unwrap_or(Value::Undefined),
            )))
        })
    });

    let reject = Value::native("Promise.reject", |args| {
        Box::pin(async move {
            Ok(Value::Promise(Promise::rejected(
                args.first().cloned().unwrap_or(Value::Undefined),
            )))
        })
    });

    env.declare(
        "Promise",
        object(vec![("all", all), ("resolve", resolve), ("reject", reject)]),
        true,
    );
}

/// Wait a value to settlement, flattening promise chains.
async fn settle(mut value: Value) -> Result<Value, Value> {
    loop {
        match value {
            Value::Promise(promise) => value = promise.wait().await?,
            settled => return Ok(settled),
        }
    }
}

fn install_json(env: &Env) {
    let stringify = Value::native("JSON.stringify", |args| {
        Box::pin(async move {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            let json = value.to_json();
            let pretty = args.get(2).is_some();
            let out = if pretty {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            out.map(Value::string)
                .map_err(|e| Value::error(format!("JSON.stringify: {}", e)))
        })
    });

    let parse = Value::native("JSON.parse", |args| {
        Box::pin(async move {
            let Some(Value::Str(source)) = args.first() else {
                return Err(Value::error("JSON.parse expects a string"));
            };
            let parsed: serde_json::Value = serde_json::from_str(source)
                .map_err(|e| Value::error(format!("JSON.parse: {}", e)))?;
            Ok(Value::from_json(&parsed))
        })
    });

    env.declare("JSON", object(vec![("stringify", stringify), ("parse", parse)]), true);
}

fn install_object(env: &Env) {
    let keys = Value::native("Object.keys", |args| {
        Box::pin(async move {
            match args.first() {
                Some(Value::Object(map)) => Ok(Value::array(
                    map.lock().keys().map(|k| Value::string(k.clone())).collect(),
                )),
                _ => Ok(Value::array(Vec::new())),
            }
        })
    });

    let values = Value::native("Object.values", |args| {
        Box::pin(async move {
            match args.first() {
                Some(Value::Object(map)) => {
                    Ok(Value::array(map.lock().values().cloned().collect()))
                }
                _ => Ok(Value::array(Vec::new())),
            }
        })
    });

    let entries = Value::native("Object.entries", |args| {
        Box::pin(async move {
            match args.first() {
                Some(Value::Object(map)) => Ok(Value::array(
                    map.lock()
                        .iter()
                        .map(|(k, v)| {
                            Value::array(vec![Value::string(k.clone()), v.clone()])
                        })
                        .collect(),
                )),
                _ => Ok(Value::array(Vec::new())),
            }
        })
    });

    env.declare(
        "Object",
        object(vec![("keys", keys), ("values", values), ("entries", entries)]),
        true,
    );
}

fn install_math(env: &Env) {
    fn unary(name: &'static str, f: fn(f64) -> f64) -> Value {
        Value::native(name, move |args| {
            Box::pin(async move {
                match args.first() {
                    Some(Value::Number(n)) => Ok(Value::Number(f(*n))),
                    _ => Ok(Value::Number(f64::NAN)),
                }
            })
        })
    }

    let min = Value::native("Math.min", |args| {
        Box::pin(async move {
            let mut min = f64::INFINITY;
            for arg in &args {
                if let Value::Number(n) = arg {
                    min = min.min(*n);
                }
            }
            Ok(Value::Number(min))
        })
    });
    let max = Value::native("Math.max", |args| {
        Box::pin(async move {
            let mut max = f64::NEG_INFINITY;
            for arg in &args {
                if let Value::Number(n) = arg {
                    max = max.max(*n);
                }
            }
            Ok(Value::Number(max))
        })
    });

    env.declare(
        "Math",
        object(vec![
            ("floor", unary("Math.floor", f64::floor)),
            ("ceil", unary("Math.ceil", f64::ceil)),
            ("round", unary("Math.round", f64::round)),
            ("abs", unary("Math.abs", f64::abs)),
            ("min", min),
            ("max", max),
        ]),
        true,
    );
}

fn install_console(env: &Env) {
    fn sink(name: &'static str, error: bool) -> Value {
        Value::native(name, move |args| {
            Box::pin(async move {
                let line =
                    args.iter().map(Value::render).collect::<Vec<_>>().join(" ");
                if error {
                    tracing::warn!(target: "pipeline", "{}", line);
                } else {
                    tracing::info!(target: "pipeline", "{}", line);
                }
                Ok(Value::Undefined)
            })
        })
    }

    env.declare(
        "console",
        object(vec![("log", sink("console.log", false)), ("error", sink("console.error", true))]),
        true,
    );
}
