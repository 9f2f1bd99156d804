// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lexical scopes.

use crate::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct Binding {
    value: Value,
    constant: bool,
}

struct Scope {
    vars: HashMap<String, Binding>,
    parent: Option<Env>,
}

/// A scope chain node. Cloning shares the scope (closures capture by
/// reference, like the dialect promises).
#[derive(Clone)]
pub struct Env {
    inner: Arc<Mutex<Scope>>,
}

impl Env {
    pub fn root() -> Self {
        Self { inner: Arc::new(Mutex::new(Scope { vars: HashMap::new(), parent: None })) }
    }

    /// A child scope whose lookups fall through to `self`.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Scope {
                vars: HashMap::new(),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Declare in the current scope, shadowing any outer binding.
    pub fn declare(&self, name: &str, value: Value, constant: bool) {
        self.inner.lock().vars.insert(name.to_string(), Binding { value, constant });
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let scope = self.inner.lock();
        if let Some(binding) = scope.vars.get(name) {
            return Some(binding.value.clone());
        }
        let parent = scope.parent.clone()?;
        drop(scope);
        parent.get(name)
    }

    /// Assign an existing binding, walking outward. Errors on unknown
    /// names and on const reassignment.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), String> {
        let mut scope = self.inner.lock();
        if let Some(binding) = scope.vars.get_mut(name) {
            if binding.constant {
                return Err(format!("cannot assign to constant {:?}", name));
            }
            binding.value = value;
            return Ok(());
        }
        let parent = scope.parent.clone();
        drop(scope);
        match parent {
            Some(parent) => parent.assign(name, value),
            None => Err(format!("assignment to undeclared variable {:?}", name)),
        }
    }
}
