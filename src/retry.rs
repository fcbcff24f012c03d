//! Bounded exponential-backoff retry execution
//!
//! Wraps a deferred operation and retries it while failures classify as
//! transient ([`SqlClientError::is_transient`]). The wait between attempts
//! is a cooperative `tokio::time::sleep`, so other tasks keep making
//! progress during backoff.
//!
//! With the default budget of 5 attempts the waits are:
//! 2^1 = 2 seconds, then
//! 2^2 = 4 seconds, then
//! 2^3 = 8 seconds, then
//! 2^4 = 16 seconds.

use crate::error::Result;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Default number of attempts (1 initial + up to 4 retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry policy with exponential backoff.
///
/// Attempts are 1-indexed; `max_attempts` bounds the total number of
/// invocations, not just the retries. The delay before retry N is
/// `2^N` seconds, so the sequence is strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given total attempt budget (minimum 1).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Total attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before the retry following attempt `attempt` (1-indexed):
    /// `2^attempt` seconds.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt))
    }
}

/// Future returned by a retryable operation.
pub type OpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Execute `op` under `policy`, re-invoking it after a backoff wait while
/// it fails with a transient error and attempts remain.
///
/// The operation borrows `cx` exclusively for the duration of each
/// attempt; the executor never retains it past completion. Fatal errors
/// and budget exhaustion propagate the original error unchanged, so the
/// caller can still inspect the server error number.
pub async fn execute<Cx, T, F>(policy: &RetryPolicy, cx: &mut Cx, mut op: F) -> Result<T>
where
    Cx: ?Sized + Send,
    F: for<'a> FnMut(&'a mut Cx) -> OpFuture<'a, T>,
{
    let mut attempt = 1u32;
    loop {
        match op(cx).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts() => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    number = err.number(),
                    attempt,
                    delay_secs = delay.as_secs(),
                    "transient SQL Server error: {err}; retrying in {}s",
                    delay.as_secs()
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
