//! Bounded exponential backoff for remote calls.
//!
//! Every remote operation in a trim run goes through [`with_backoff`]: the
//! operation is attempted up to a configured number of times, sleeping
//! `2^attempt` seconds between attempts. There is deliberately no jitter and
//! no delay cap; the attempt bound is the cap.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Delay before the retry that follows a failed attempt.
///
/// Attempts are numbered from 1, so the ladder is 2s, 4s, 8s, ...
pub fn delay_for_attempt(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}

/// Execute an async operation with bounded exponential backoff.
///
/// The `operation` closure is called once per attempt. Errors are retried
/// only while `is_retryable` returns true and attempts remain; the last
/// error is returned once attempts are exhausted or the error is classified
/// as permanent.
pub async fn with_backoff<F, Fut, T, E, P>(
    operation_name: &str,
    max_attempts: u32,
    is_retryable: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) => {
                if is_retryable(&error) && attempt < max_attempts {
                    let delay = delay_for_attempt(attempt);
                    warn!(
                        operation = operation_name,
                        error = %error,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_secs = delay.as_secs(),
                        "Retryable error, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                if attempt > 1 {
                    warn!(
                        operation = operation_name,
                        error = %error,
                        attempts = attempt,
                        "Operation failed after all retry attempts"
                    );
                }

                return Err(error);
            }
        }
    }

    // This shouldn't be reached, but just in case
    unreachable!("Retry loop should have returned")
}
