// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secrets manager seam.
//!
//! The encrypted secret store is an external collaborator; the runner only
//! consumes this interface. Lookup tries pipeline scope before global
//! scope. The environment-backed manager is the default wiring; the static
//! manager serves tests and one-shot runs.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Where a secret is scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretScope {
    /// Scoped to one pipeline (keyed by run ID).
    Pipeline(String),
    Global,
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret backend error: {0}")]
    Backend(String),
}

/// Read-only secret lookup.
#[async_trait]
pub trait SecretsManager: Send + Sync {
    /// `Ok(None)` means the secret does not exist in that scope.
    async fn get(&self, scope: SecretScope, name: &str) -> Result<Option<String>, SecretError>;
}

/// Secrets from the process environment.
///
/// `KILN_SECRET_<NAME>` for global scope; pipeline scope is not
/// addressable through the environment and always misses.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretsManager;

#[async_trait]
impl SecretsManager for EnvSecretsManager {
    async fn get(&self, scope: SecretScope, name: &str) -> Result<Option<String>, SecretError> {
        if matches!(scope, SecretScope::Pipeline(_)) {
            return Ok(None);
        }
        let key = format!("KILN_SECRET_{}", name.to_ascii_uppercase());
        Ok(std::env::var(key).ok())
    }
}

/// Fixed in-memory secrets.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretsManager {
    global: HashMap<String, String>,
    pipeline: HashMap<(String, String), String>,
}

impl StaticSecretsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, name: &str, value: &str) -> Self {
        self.global.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_pipeline(mut self, run_id: &str, name: &str, value: &str) -> Self {
        self.pipeline.insert((run_id.to_string(), name.to_string()), value.to_string());
        self
    }
}

#[async_trait]
impl SecretsManager for StaticSecretsManager {
    async fn get(&self, scope: SecretScope, name: &str) -> Result<Option<String>, SecretError> {
        Ok(match scope {
            SecretScope::Pipeline(run_id) => {
                self.pipeline.get(&(run_id, name.to_string())).cloned()
            }
            SecretScope::Global => self.global.get(name).cloned(),
        })
    }
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
