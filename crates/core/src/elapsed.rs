// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable durations for task status rows.

use std::time::Duration;

/// Format a duration as `"Xh Ym Zs"`, rounded to whole seconds.
///
/// Larger units elide when zero: `5s`, `2m 3s`, `1h 0m 12s`. Sub-second
/// durations round to `0s` or `1s`.
pub fn format_elapsed(d: Duration) -> String {
    let total = d.as_secs_f64().round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
#[path = "elapsed_tests.rs"]
mod tests;
