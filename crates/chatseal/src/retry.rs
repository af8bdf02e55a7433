//! Timeout and bounded retry around collaborator calls.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryPolicy;
use crate::error::{KeyError, Result};

/// Run `call` under `timeout`, retrying retryable failures per `policy`.
///
/// A timeout counts as [`ErrorKind::EscrowUnavailable`](crate::ErrorKind).
/// Non-retryable errors return on the first occurrence.
pub(crate) async fn with_retry<T, E, F, Fut>(
    operation: &'static str,
    policy: &RetryPolicy,
    timeout: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<KeyError>,
{
    let mut attempt = 1u32;
    loop {
        let outcome = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(KeyError::Timeout {
                operation,
                after: timeout,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::warn!(operation, attempts = attempt, error = %err, "retries exhausted");
                }
                return Err(err);
            }
        }
    }
}
