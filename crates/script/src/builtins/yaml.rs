// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `YAML.parse` / `YAML.stringify`. Parse failures interrupt the VM.

use super::object;
use crate::env::Env;
use crate::interp::interrupt_value;
use crate::value::Value;

pub fn install(env: &Env) {
    let parse = Value::native("YAML.parse", |args| {
        Box::pin(async move {
            let Some(Value::Str(source)) = args.first() else {
                return Err(interrupt_value("YAML.parse expects a string"));
            };
            let parsed: serde_json::Value = serde_yaml::from_str(source)
                .map_err(|e| interrupt_value(format!("YAML parse error: {}", e)))?;
            Ok(Value::from_json(&parsed))
        })
    });

    let stringify = Value::native("YAML.stringify", |args| {
        Box::pin(async move {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            serde_yaml::to_string(&value.to_json())
                .map(Value::string)
                .map_err(|e| interrupt_value(format!("YAML stringify error: {}", e)))
        })
    });

    env.declare("YAML", object(vec![("parse", parse), ("stringify", stringify)]), true);
}
