//! Generic retry helper for account reads
//!
//! Account fetches retry on two conditions: a retryable [`RpcError`] and an
//! `Ok(None)` answer, since an account created seconds ago is often not yet
//! visible to the node we ask.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::rpc_errors::RpcError;

/// Linear backoff retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial attempt)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Added to the delay on each further attempt
    pub step: Duration,
    /// Deadline for a single attempt
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(300))
    }
}

impl RetryPolicy {
    /// Same delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            step: Duration::ZERO,
            attempt_timeout: None,
        }
    }

    /// Delay grows by `step` after each attempt
    pub fn linear(max_attempts: u32, base_delay: Duration, step: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            step,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = Some(attempt_timeout);
        self
    }

    /// Delay after the given 0-indexed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay + self.step * attempt
    }
}

/// Run `operation` until it yields `Some`, fails permanently, or attempts run out
///
/// The closure receives the 0-indexed attempt number so callers can vary
/// parameters such as commitment between attempts. Exhausting attempts on
/// `Ok(None)` returns `Ok(None)`; exhausting them on errors returns the last
/// error.
pub async fn retry_linear<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<Option<T>, RpcError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, RpcError>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        let result = match policy.attempt_timeout {
            Some(limit) => match timeout(limit, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout {
                    method: operation_name.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => operation(attempt).await,
        };

        match result {
            Ok(Some(value)) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(Some(value));
            }
            Ok(None) => {
                last_error = None;
            }
            Err(err) if !err.is_retryable() => {
                debug!(
                    operation = operation_name,
                    error = %err,
                    "Permanent error, not retrying"
                );
                return Err(err);
            }
            Err(err) => {
                debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %err,
                    "Transient error"
                );
                last_error = Some(err);
            }
        }

        if attempt + 1 < policy.max_attempts {
            sleep(policy.delay_after(attempt)).await;
        }
    }

    match last_error {
        Some(err) => {
            warn!(
                operation = operation_name,
                attempts = policy.max_attempts,
                error = %err,
                "All retry attempts exhausted"
            );
            Err(err)
        }
        None => Ok(None),
    }
}
