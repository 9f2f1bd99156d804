// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script-facing run and volume inputs.
//!
//! These are what a pipeline script hands to `runtime.run` /
//! `runtime.createVolume`; the runner lowers a [`RunInput`] to a
//! [`TaskSpec`](crate::TaskSpec) after resolving secrets and deriving IDs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Input to one `runtime.run` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunInput {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    /// Values prefixed `secret:` resolve through the secrets manager.
    pub env: IndexMap<String, String>,
    pub cwd: Option<String>,
    pub user: Option<u32>,
    pub privileged: bool,
    pub cpu_shares: Option<u64>,
    pub memory_bytes: Option<u64>,
    /// Volume name → in-container path, in script insertion order.
    pub mounts: IndexMap<String, String>,
    /// Only a non-empty string attaches stdin; absent and empty are the
    /// same from the script's side.
    pub stdin: String,
    /// Per-step timeout, e.g. `"2s"`, `"1m30s"`.
    pub timeout: Option<String>,
}

/// Input to one `runtime.createVolume` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeInput {
    /// Auto-assigned deterministically when absent.
    pub name: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Result of `runtime.createVolume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeResult {
    pub name: String,
}

/// Parse a Go-style duration literal: decimal numbers with `h`, `m`, `s`,
/// or `ms` units, concatenated (`"90s"`, `"1m30s"`, `"1h0m5s"`, `"250ms"`).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = s.chars().peekable();
    let mut matched = false;
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            digits.push(c);
            continue;
        }
        let value: f64 = digits
            .parse()
            .map_err(|_| format!("invalid duration {:?}: bad number {:?}", input, digits))?;
        digits.clear();
        let unit = match c {
            'h' => 3600.0,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                0.001
            }
            'm' => 60.0,
            's' => 1.0,
            _ => return Err(format!("invalid duration {:?}: unknown unit {:?}", input, c)),
        };
        total += Duration::from_secs_f64(value * unit);
        matched = true;
    }
    if !digits.is_empty() {
        return Err(format!("invalid duration {:?}: trailing number {:?}", input, digits));
    }
    if !matched {
        return Err(format!("invalid duration {:?}: no units", input));
    }
    Ok(total)
}

#[cfg(test)]
#[path = "input_tests.rs"]
mod tests;
