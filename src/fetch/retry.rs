//! Retry discipline shared by every fetch shape

use crate::config::FetchConfig;
use crate::CrawlError;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// How many times to attempt a fetch and how long to back off in between
///
/// Attempts are numbered from 0. Before attempt `n` (for `n >= 1`) the
/// fetcher sleeps `n × backoff_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff_step: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 9;
    pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(3);

    /// Creates a policy; at least one attempt is always made
    pub fn new(attempts: u32, backoff_step: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_step,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.retry_count, config.backoff_step())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn backoff_step(&self) -> Duration {
        self.backoff_step
    }

    /// Delay inserted before the given (zero-based) attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// Runs `operation` until it succeeds, fails permanently, or runs out of attempts
    ///
    /// Only transient errors are retried. Whatever the last attempt returned
    /// is handed back unchanged.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        url: &Url,
        action: &str,
        mut operation: F,
    ) -> Result<T, CrawlError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CrawlError>>,
    {
        let mut attempt = 0;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };

            tracing::warn!(
                url = %url,
                attempt = attempt + 1,
                attempts = self.attempts,
                error = %error,
                "failed to {}",
                action
            );

            attempt += 1;
            if attempt >= self.attempts {
                return Err(error);
            }

            tokio::time::sleep(self.delay_before(attempt)).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_BACKOFF_STEP)
    }
}
