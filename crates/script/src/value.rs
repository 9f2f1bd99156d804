// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime values.
//!
//! Arrays and objects are shared mutable references (`Arc` + mutex) so
//! script-side aliasing behaves the way the dialect promises. Everything
//! is `Send`: the interpreter is one task, but promise workers move values
//! across threads.

use crate::ast::Function;
use crate::env::Env;
use crate::promise::Promise;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type Array = Arc<Mutex<Vec<Value>>>;
pub type Object = Arc<Mutex<IndexMap<String, Value>>>;

/// Native (host-provided) function. Errors are thrown values.
pub type NativeFn = Arc<
    dyn Fn(Vec<Value>) -> Pin<Box<dyn Future<Output = Result<Value, Value>> + Send>>
        + Send
        + Sync,
>;

/// A script function together with its captured environment.
pub struct Closure {
    pub func: Function,
    pub env: Env,
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Array),
    Object(Object),
    Closure(Arc<Closure>),
    Native { name: &'static str, f: NativeFn },
    Promise(Promise),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(Mutex::new(items)))
    }

    pub fn object(map: IndexMap<String, Value>) -> Self {
        Value::Object(Arc::new(Mutex::new(map)))
    }

    pub fn empty_object() -> Self {
        Value::object(IndexMap::new())
    }

    /// Build a native function value.
    pub fn native<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Pin<Box<dyn Future<Output = Result<Value, Value>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        Value::Native { name, f: Arc::new(f) }
    }

    /// An error object shaped like a JS `Error`: `{name, message, stack}`.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut map = IndexMap::new();
        map.insert("name".to_string(), Value::string("Error"));
        map.insert("message".to_string(), Value::string(message.clone()));
        map.insert("stack".to_string(), Value::string(format!("Error: {}", message)));
        Value::object(map)
    }

    /// JS-like truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Closure(_) | Value::Native { .. } => "function",
            Value::Promise(_) => "promise",
        }
    }

    /// Loose structural equality (`==` in the dialect).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined)
            | (Value::Null, Value::Null)
            | (Value::Undefined, Value::Null)
            | (Value::Null, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.lock(), b.lock());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.lock(), b.lock());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            _ => false,
        }
    }

    /// String rendering used by template literals, `+`, and error reports.
    pub fn render(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => render_number(*n),
            Value::Str(s) => s.clone(),
            Value::Array(items) => {
                let items = items.lock();
                let rendered: Vec<String> = items.iter().map(Value::render).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Object(map) => {
                let map = map.lock();
                // Error-shaped objects render like JS errors.
                if let (Some(Value::Str(name)), Some(Value::Str(message))) =
                    (map.get("name"), map.get("message"))
                {
                    return format!("{}: {}", name, message);
                }
                let rendered: Vec<String> =
                    map.iter().map(|(k, v)| format!("{}: {}", k, v.render())).collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Closure(c) => {
                format!("[function {}]", c.func.name.as_deref().unwrap_or("anonymous"))
            }
            Value::Native { name, .. } => format!("[native {}]", name),
            Value::Promise(_) => "[promise]".to_string(),
        }
    }

    /// Convert to JSON. Functions and pending promises have no JSON form
    /// and become `null`, matching `JSON.stringify`'s treatment closely
    /// enough for the storage and YAML seams.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.lock().iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.lock().iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Closure(_) | Value::Native { .. } | Value::Promise(_) => {
                serde_json::Value::Null
            }
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Integer-valued floats print without the trailing `.0`.
fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
