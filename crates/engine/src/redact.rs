// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret redaction for task output.
//!
//! Literal substring replacement, never regex — secret values routinely
//! contain metacharacters. Longest value first so a secret that embeds
//! another is wiped whole rather than leaving its tail behind.

/// What a redacted secret reads as.
pub const PLACEHOLDER: &str = "***REDACTED***";

/// Replace every occurrence of every secret value with [`PLACEHOLDER`].
///
/// Empty values and duplicates are elided. Idempotent: output contains no
/// secret, so a second pass changes nothing.
pub fn redact(text: &str, secrets: &[String]) -> String {
    let mut values: Vec<&str> =
        secrets.iter().map(String::as_str).filter(|s| !s.is_empty()).collect();
    values.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    values.dedup();

    let mut out = text.to_string();
    for value in values {
        out = out.replace(value, PLACEHOLDER);
    }
    out
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
