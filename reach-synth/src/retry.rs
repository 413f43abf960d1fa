use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::GenerationError;

/// Exponential backoff applied to rate-limited generator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the zero-based `attempt` failed: base, 2x base, 4x base...
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(8);
        let multiplier = 2u32.saturating_pow(exponent) as f64;
        self.base_delay
            .mul_f64(multiplier)
            .min(Duration::from_secs(5 * 60))
    }

    /// Runs `operation` until it succeeds, fails with anything other than a
    /// rate limit, or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation().await {
                Err(err) if err.is_rate_limited() && attempt + 1 < attempts => {
                    let wait = self.backoff_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use test_case::test_case;

    #[test_case(0, 1; "first retry")]
    #[test_case(1, 2; "second retry")]
    #[test_case(2, 4; "third retry")]
    fn doubles_each_attempt(attempt: u32, seconds: u64) {
        assert_eq!(
            RetryPolicy::default().backoff_for_attempt(attempt),
            Duration::from_secs(seconds)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result: Result<(), _> = RetryPolicy::default()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GenerationError::RateLimited) }
            })
            .await;

        assert_eq!(result, Err(GenerationError::RateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GenerationError::Http("connection reset".into())) }
            })
            .await;

        assert!(matches!(result, Err(GenerationError::Http(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
