//! Reactive recovery from budget rejections with bounded backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::{OutlineError, Result};

/// Retries an operation while it keeps failing with
/// [`OutlineError::RateLimitExceeded`].
///
/// The delay before retry `n` (0-based) is `base_delay * 2^n`, raised to
/// the server-suggested wait when that is larger. Any other error is
/// returned after the first failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Maximum number of retries after the initial attempt.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Delay to sleep before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: usize, suggested: Option<Duration>) -> Duration {
        let exp = retry.min(16) as u32;
        let computed = self.base_delay.saturating_mul(1u32 << exp);
        match suggested {
            Some(suggested) => computed.max(suggested),
            None => computed,
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable
    /// error, or the retry budget is spent.
    pub async fn attempt<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0usize;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(OutlineError::RateLimitExceeded { retry_after, .. })
                    if retry < self.max_retries =>
                {
                    let delay = self.delay_for(retry, retry_after);

                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );

                    sleep(delay).await;
                    retry += 1;
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    if err.is_rate_limited() {
                        tracing::warn!(attempts = retry + 1, "rate limit retries exhausted");
                    }

                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
