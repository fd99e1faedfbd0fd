//! Bounded retry with exponential backoff and jitter
//!
//! Used by the native driver for persist-answer and finish calls, so a brief
//! network hiccup neither loses an answer nor stalls the attempt in an error
//! state. Only transient failures are retried.

use garde::Validate;
use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::constants::retry;

/// Retry bounds
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first one
    #[garde(range(min = 1, max = retry::MAX_ATTEMPTS))]
    pub max_attempts: u32,
    /// Backoff before the first retry
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[garde(skip)]
    pub base_backoff: Duration,
    /// Cap on the backoff between two attempts
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[garde(skip)]
    pub max_backoff: Duration,
    /// Upper bound of the random jitter added to each backoff
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[garde(skip)]
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(retry::DEFAULT_BASE_BACKOFF_MILLIS),
            max_backoff: Duration::from_millis(retry::DEFAULT_MAX_BACKOFF_MILLIS),
            jitter: Duration::from_millis(retry::DEFAULT_JITTER_MILLIS),
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff after the given failed attempt (1-based), without jitter
    ///
    /// Doubles from `base_backoff` and never exceeds `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    /// Backoff after the given failed attempt with random jitter added
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_millis = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_millis == 0 {
            0
        } else {
            fastrand::u64(0..=jitter_millis)
        };
        self.backoff_for(attempt) + Duration::from_millis(extra)
    }
}

/// Runs `f` until it succeeds, fails permanently, or attempts run out
///
/// # Arguments
///
/// * `config` - Retry bounds
/// * `should_retry` - Decides whether an error is worth another attempt
/// * `f` - Produces one attempt
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first error
/// `should_retry` rejects.
#[cfg(feature = "native")]
pub async fn retry_async<F, Fut, T, E, R>(config: RetryConfig, should_retry: R, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= config.max_attempts || !should_retry(&error) {
                    return Err(error);
                }
                let delay = config.delay_for(attempt);
                tracing::debug!(attempt, ?delay, %error, "retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = config(5);
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(400));
        assert_eq!(config.backoff_for(4), Duration::from_millis(500));
        assert_eq!(config.backoff_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let config = RetryConfig {
            jitter: Duration::from_millis(50),
            ..config(3)
        };
        for _ in 0..100 {
            let delay = config.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_attempt_bounds_are_validated() {
        assert!(config(0).validate().is_err());
        assert!(config(11).validate().is_err());
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[cfg(feature = "native")]
    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let calls = Cell::new(0);

        let result: Result<u32, String> = retry_async(config(3), |_| true, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 3 { Err("offline".to_owned()) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result, Ok(3));
    }

    #[cfg(feature = "native")]
    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = Cell::new(0);

        let result: Result<(), String> = retry_async(config(2), |_| true, || {
            calls.set(calls.get() + 1);
            async { Err("offline".to_owned()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[cfg(feature = "native")]
    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = Cell::new(0);

        let result: Result<(), String> = retry_async(config(4), |e: &String| e != "rejected", || {
            calls.set(calls.get() + 1);
            async { Err("rejected".to_owned()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
