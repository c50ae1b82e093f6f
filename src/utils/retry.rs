// snapshotdump/src/utils/retry.rs
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::Result;

/// Bounded, fixed-delay retry settings for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// One attempt, no retry.
    pub fn single() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn with_attempts(self, max_attempts: u32) -> Self {
        Self { max_attempts, ..self }
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` attempts have been made. The last error is returned
/// unchanged. There is no sleep after the final attempt.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(operation = op_name, attempt, max_attempts, "Attempting operation");

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = op_name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                warn!(
                    operation = op_name,
                    attempt,
                    max_attempts,
                    error = %err,
                    "⚠️ Transient failure, retrying in {}s",
                    policy.delay.as_secs()
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(operation = op_name, attempts = attempt, error = %err, "❌ Giving up after retries");
                }
                return Err(err);
            }
        }
    }
}
