// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script assertions. A failure interrupts the VM — `catch` cannot
//! swallow it — and the error message always carries the literal
//! substring `assertion failed`.

use super::object;
use crate::env::Env;
use crate::interp::interrupt_value;
use crate::value::Value;

fn fail(detail: String, custom: Option<&Value>) -> Value {
    let suffix = match custom {
        Some(Value::Str(s)) if !s.is_empty() => format!(": {}", s),
        _ => String::new(),
    };
    interrupt_value(format!("assertion failed: {}{}", detail, suffix))
}

pub fn install(env: &Env) {
    let equal = Value::native("assert.equal", |args| {
        Box::pin(async move {
            let a = args.first().cloned().unwrap_or(Value::Undefined);
            let b = args.get(1).cloned().unwrap_or(Value::Undefined);
            if a.loose_eq(&b) {
                Ok(Value::Undefined)
            } else {
                Err(fail(
                    format!("expected {} to equal {}", a.render(), b.render()),
                    args.get(2),
                ))
            }
        })
    });

    let not_equal = Value::native("assert.notEqual", |args| {
        Box::pin(async move {
            let a = args.first().cloned().unwrap_or(Value::Undefined);
            let b = args.get(1).cloned().unwrap_or(Value::Undefined);
            if a.loose_eq(&b) {
                Err(fail(
                    format!("expected {} to not equal {}", a.render(), b.render()),
                    args.get(2),
                ))
            } else {
                Ok(Value::Undefined)
            }
        })
    });

    let truthy = Value::native("assert.truthy", |args| {
        Box::pin(async move {
            let v = args.first().cloned().unwrap_or(Value::Undefined);
            if v.truthy() {
                Ok(Value::Undefined)
            } else {
                Err(fail(format!("expected {} to be truthy", v.render()), args.get(1)))
            }
        })
    });

    let contains_string = Value::native("assert.containsString", |args| {
        Box::pin(async move {
            let haystack = args.first().cloned().unwrap_or(Value::Undefined);
            let needle = args.get(1).cloned().unwrap_or(Value::Undefined);
            match (&haystack, &needle) {
                (Value::Str(haystack), Value::Str(needle)) if haystack.contains(needle) => {
                    Ok(Value::Undefined)
                }
                _ => Err(fail(
                    format!(
                        "expected {} to contain {}",
                        haystack.render(),
                        needle.render()
                    ),
                    args.get(2),
                )),
            }
        })
    });

    let contains_element = Value::native("assert.containsElement", |args| {
        Box::pin(async move {
            let haystack = args.first().cloned().unwrap_or(Value::Undefined);
            let needle = args.get(1).cloned().unwrap_or(Value::Undefined);
            match &haystack {
                Value::Array(items) if items.lock().iter().any(|v| v.loose_eq(&needle)) => {
                    Ok(Value::Undefined)
                }
                _ => Err(fail(
                    format!(
                        "expected {} to contain element {}",
                        haystack.render(),
                        needle.render()
                    ),
                    args.get(2),
                )),
            }
        })
    });

    env.declare(
        "assert",
        object(vec![
            ("equal", equal),
            ("notEqual", not_equal),
            ("truthy", truthy),
            ("containsString", contains_string),
            ("containsElement", contains_element),
        ]),
        true,
    );
}
