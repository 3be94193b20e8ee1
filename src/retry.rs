//! Retry policy for per-meal scrapes.
//!
//! By default a meal page gets exactly one attempt. When retries are configured, failed attempts
//! are repeated with exponential backoff and jitter:
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::error::ScrapeError;
use rand::{Rng, rng};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    max_retries: usize,
    /// Initial delay between attempts (doubles with each attempt).
    base_delay: Duration,
    /// Cap on the backoff delay.
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(0, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(1 << shift)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds or the retries are used up; the last error is returned.
    pub async fn run<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, ScrapeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScrapeError>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.delay_for(attempt) + Duration::from_millis(jitter_ms);
                    warn!(
                        %url,
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        ?delay,
                        error = %e,
                        "Scrape attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(9), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_default_policy_makes_single_attempt() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run("https://example.com", || {
                calls.set(calls.get() + 1);
                async { Err(ScrapeError::navigation("https://example.com", "HTTP 500")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result = policy
            .run("https://example.com", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(ScrapeError::navigation("https://example.com", "timed out"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }
}
