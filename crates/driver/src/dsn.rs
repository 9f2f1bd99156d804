// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver DSN parsing.
//!
//! Grammar:
//!
//! ```text
//! name
//! name:k=v,k=v
//! name://namespace?k=v&k=v
//! ```
//!
//! The plain and short forms never fail; only the URL form can, and only
//! on a malformed authority or query. Parameter lookup is "DSN param wins,
//! else environment variable, else default" — the ordering that lets tests
//! inject params without touching the process environment.

use crate::DriverError;
use indexmap::IndexMap;

/// Environment variable prefix for parameter fallback (`host` → `KILN_HOST`).
const ENV_PREFIX: &str = "KILN_";

/// A parsed driver DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub name: String,
    pub namespace: Option<String>,
    pub params: DriverParams,
}

impl Dsn {
    /// Parse a DSN string.
    ///
    /// The first `:` decides the form: followed by `//` it is the URL
    /// form, otherwise the short form — so a short-form value like
    /// `host=tcp://h:1` never reads as a URL.
    pub fn parse(input: &str) -> Result<Self, DriverError> {
        let Some((name, rest)) = input.split_once(':') else {
            return Ok(Self {
                name: input.to_string(),
                namespace: None,
                params: DriverParams::new(IndexMap::new()),
            });
        };

        if let Some(rest) = rest.strip_prefix("//") {
            if name.is_empty() {
                return Err(DriverError::Config(format!("malformed DSN {:?}: empty name", input)));
            }
            let (namespace, query) = match rest.split_once('?') {
                Some((ns, q)) => (ns, Some(q)),
                None => (rest, None),
            };
            if namespace.contains('/') {
                return Err(DriverError::Config(format!(
                    "malformed DSN {:?}: namespace may not contain '/'",
                    input
                )));
            }
            let mut params = IndexMap::new();
            if let Some(query) = query {
                for pair in query.split('&').filter(|p| !p.is_empty()) {
                    let (k, v) = pair.split_once('=').ok_or_else(|| {
                        DriverError::Config(format!(
                            "malformed DSN {:?}: query pair {:?} has no '='",
                            input, pair
                        ))
                    })?;
                    params.insert(k.to_string(), v.to_string());
                }
            }
            return Ok(Self {
                name: name.to_string(),
                namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
                params: DriverParams::new(params),
            });
        }

        let mut params = IndexMap::new();
        for pair in rest.split(',').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((k, v)) => params.insert(k.to_string(), v.to_string()),
                // Bare words in the short form are tolerated as flags.
                None => params.insert(pair.to_string(), String::new()),
            };
        }
        Ok(Self {
            name: name.to_string(),
            namespace: None,
            params: DriverParams::new(params),
        })
    }

    /// Render back to a DSN string. Parse∘render preserves name, namespace,
    /// and params.
    pub fn render(&self) -> String {
        match &self.namespace {
            Some(ns) => {
                let mut out = format!("{}://{}", self.name, ns);
                if !self.params.is_empty() {
                    out.push('?');
                    out.push_str(&self.params.render('&'));
                }
                out
            }
            None if self.params.is_empty() => self.name.clone(),
            None => format!("{}:{}", self.name, self.params.render(',')),
        }
    }
}

impl std::fmt::Display for Dsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// DSN parameters with environment fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverParams {
    params: IndexMap<String, String>,
}

impl DriverParams {
    pub fn new(params: IndexMap<String, String>) -> Self {
        Self { params }
    }

    /// Build params from key/value pairs (tests, executor overrides).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { params: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    /// Look up a parameter: DSN value, else `KILN_<KEY>` env var, else `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(v) = self.params.get(key) {
            return Some(v.clone());
        }
        std::env::var(format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())).ok()
    }

    /// Look up a parameter with a default.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a numeric parameter, falling back to the default on absence
    /// or garbage.
    pub fn get_u64_or(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Raw DSN-level entry, without environment fallback.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn render(&self, sep: char) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.params.iter().enumerate() {
            if i > 0 {
                out.push(sep);
            }
            out.push_str(k);
            if !(sep == ',' && v.is_empty()) {
                out.push('=');
                out.push_str(v);
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "dsn_tests.rs"]
mod tests;
