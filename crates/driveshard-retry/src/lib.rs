//! Retry primitive with exponential backoff
//!
//! The single place in the engine where sleeps exist. Every upstream
//! interaction (drive API, OAuth endpoints) runs through [`retry`] with a
//! retryability predicate; delays grow exponentially up to a ceiling, with
//! optional uniform jitter of up to 25% of the base delay.
//!
//! Cancellation is checked before every attempt and during every sleep. A
//! cancelled operation surfaces [`RetryError::Cancelled`], never
//! [`RetryError::Exhausted`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use driveshard_core::config::RetrySettings;

/// Backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Exponential growth factor
    pub multiplier: f64,
    /// Add up to 25% uniform jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Build from the configuration file section
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter,
        }
    }

    /// Base delay before retry number `attempt` (zero-based), capped at
    /// `max_delay`, jitter not applied
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Failure of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The cancellation handle fired before the operation succeeded
    #[error("operation cancelled")]
    Cancelled,

    /// The operation failed on its final attempt, or failed with a
    /// non-retryable error
    #[error("operation failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Attempts actually made
        attempts: u32,
        /// The last error observed
        #[source]
        source: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The underlying error, when the retries were exhausted
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Cancelled => None,
            Self::Exhausted { source, .. } => Some(source),
        }
    }
}

/// Run `op` with exponential backoff
///
/// `op` receives the zero-based attempt number. On error, the attempt is
/// retried when `is_retryable` says so and attempts remain; otherwise the
/// error surfaces wrapped with the attempt count.
///
/// # Errors
/// [`RetryError::Cancelled`] when `cancel` fires, [`RetryError::Exhausted`]
/// when the final or a non-retryable error is hit.
pub async fn retry<T, E, F, Fut, P>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let last = attempt + 1 >= max_attempts;
                if last || !is_retryable(&err) {
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        source: err,
                    });
                }

                let delay = apply_jitter(config.base_delay(attempt), config.jitter);
                debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable failure, backing off"
                );

                tokio::select! {
                    () = cancel.cancelled() => return Err(RetryError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // max_attempts >= 1, so the loop always returns
    unreachable!("retry loop exited without a result")
}

/// Stretch `base` by a uniform factor in [1.0, 1.25)
fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if !jitter {
        return base;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(0.0..0.25);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Error, PartialEq)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<u32, _> = retry(
            &config(3),
            &cancel,
            |_: &TestError| true,
            move |_| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_calls_op_exactly_max_attempts_times() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = retry(
            &config(3),
            &cancel,
            |_: &TestError| true,
            move |_| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Transient)
                }
            },
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source, TestError::Transient);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two sleeps: 100ms then 200ms
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<(), _> = retry(
            &config(5),
            &cancel,
            |e: &TestError| *e != TestError::Fatal,
            move |_| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Fatal)
                }
            },
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<&str, _> = retry(
            &RetryConfig {
                initial_delay: Duration::from_millis(1),
                ..config(5)
            },
            &cancel,
            |_: &TestError| true,
            move |attempt| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(TestError::Transient)
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pre_cancelled_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<(), RetryError<TestError>> = retry(
            &config(3),
            &cancel,
            |_| true,
            move |_| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep() {
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel2.cancel();
        });

        let result: Result<(), _> = retry(
            &RetryConfig {
                initial_delay: Duration::from_secs(3600),
                ..config(3)
            },
            &cancel,
            |_: &TestError| true,
            |_| async { Err(TestError::Transient) },
        )
        .await;

        // cancelled mid-sleep, not exhausted
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[test]
    fn test_base_delay_progression_and_cap() {
        let cfg = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(450),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(cfg.base_delay(0), Duration::from_millis(100));
        assert_eq!(cfg.base_delay(1), Duration::from_millis(200));
        assert_eq!(cfg.base_delay(2), Duration::from_millis(400));
        assert_eq!(cfg.base_delay(3), Duration::from_millis(450));
        assert_eq!(cfg.base_delay(9), Duration::from_millis(450));
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = apply_jitter(base, true);
            assert!(jittered >= base);
            assert!(jittered < Duration::from_millis(1250));
        }
        assert_eq!(apply_jitter(base, false), base);
    }
}
