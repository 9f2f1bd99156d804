// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Name sanitization for backend resource names and step IDs.

/// Sanitize a user-supplied name for use in backend resource names.
///
/// Lowercases, maps every character outside `[a-z0-9-]` to a hyphen
/// (spaces and underscores included), collapses hyphen runs, trims leading
/// and trailing hyphens, and caps the result at `max_len` bytes. The result
/// never ends with a hyphen even after truncation.
pub fn sanitize_name(name: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(name.len().min(max_len));
    let mut last_hyphen = true; // suppress leading hyphens
    for c in name.chars() {
        let c = match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => c,
            _ => '-',
        };
        if c == '-' {
            if last_hyphen {
                continue;
            }
            last_hyphen = true;
        } else {
            last_hyphen = false;
        }
        if out.len() >= max_len {
            break;
        }
        out.push(c);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
