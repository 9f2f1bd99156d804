// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with exponential backoff for transient backend conflicts.

use std::future::Future;
use std::time::Duration;

/// Initial delay between cleanup retries.
pub const INITIAL_DELAY: Duration = Duration::from_secs(1);
/// Total attempts for namespace cleanup operations.
pub const MAX_ATTEMPTS: usize = 5;

/// Run `op` up to `max_attempts` times, sleeping `initial` doubling after
/// each failure. Returns the first success or the last error.
pub async fn retry<F, Fut, T, E>(max_attempts: usize, initial: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = initial;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, String> = retry(5, Duration::from_secs(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("conflict".to_string()) } else { Ok(7) } }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, String> = retry(5, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still broken".to_string()) }
        })
        .await;
        assert_eq!(result, Err("still broken".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_double() {
        // 5 attempts sleep 1+2+4+8 = 15s total; paused time makes this exact.
        let start = tokio::time::Instant::now();
        let _: Result<(), String> =
            retry(5, Duration::from_secs(1), || async { Err("nope".to_string()) }).await;
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }
}
