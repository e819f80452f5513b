//! Deadline and retry decorators for upstream calls.

use super::UpstreamError;
use std::{future::Future, time::Duration};
use tracing::debug;

/// Bounds `fut` by `deadline`. The abandoned request is not cancelled upstream.
///
/// # Errors
///
/// [`UpstreamError::Timeout`] when the deadline passes, otherwise the future's own error.
pub async fn with_timeout<T, F>(deadline: Duration, fut: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    tokio::time::timeout(deadline, fut).await.unwrap_or(Err(UpstreamError::Timeout))
}

/// Runs `op` up to `attempts` times, sleeping `delay` between attempts.
///
/// Only transient errors ([`UpstreamError::is_transient`]) are retried; anything else,
/// including reverts, is returned immediately.
///
/// # Errors
///
/// The last error once attempts are exhausted, or the first non-transient error.
pub async fn with_retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                debug!(attempt, attempts, error = %e, "retrying transient upstream error");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
