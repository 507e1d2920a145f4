//! Deadline-bounded retry for remote operations.
//!
//! Every remote call made during an install goes through a [`RetryGate`]. The gate
//! retries only connection-level failures ([`Error::is_retryable`]) and gives up
//! with [`Error::DeadlineExceeded`] once the install's shared [`Deadline`] passes.
//!
//! # Example
//!
//! ```ignore
//! use staticpod_common::retry::{Deadline, RetryConfig, RetryGate};
//!
//! let gate = RetryGate::new(Deadline::after(timeout), RetryConfig::default());
//! let secret = gate
//!     .run("get secret etcd-serving-3", || client.get_secret(ns, "etcd-serving-3"))
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::Error;

/// Default delay between attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for the delay between attempts when backoff is enabled
pub const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Used in place of timeouts too large to add to the current instant
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Point in time after which no further remote work is attempted.
///
/// One deadline is created per install and shared by every gate, so time spent
/// staging secrets is not available again for the pod template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now.
    ///
    /// Timeouts that overflow the clock saturate to roughly thirty years.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            at: now
                .checked_add(timeout)
                .unwrap_or_else(|| now + FAR_FUTURE),
        }
    }

    /// Deadline at a fixed instant
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// The instant this deadline fires
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before the deadline (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Delay policy between attempts.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Delay before the second attempt
    pub interval: Duration,
    /// Maximum delay between attempts
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each failed attempt (1.0 = fixed)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
            max_interval: DEFAULT_MAX_RETRY_INTERVAL,
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryConfig {
    /// Fixed-interval polling
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff_multiplier: 1.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let secs = (delay.as_secs_f64() * self.backoff_multiplier)
            .min(self.max_interval.as_secs_f64())
            .max(self.interval.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_interval)
    }
}

/// Retries transient failures of a single remote operation until a deadline.
#[derive(Clone, Debug)]
pub struct RetryGate {
    deadline: Deadline,
    config: RetryConfig,
}

impl RetryGate {
    /// Create a gate bound to `deadline`
    pub fn new(deadline: Deadline, config: RetryConfig) -> Self {
        Self { deadline, config }
    }

    /// The deadline this gate enforces
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the deadline passes.
    ///
    /// The deadline is checked before every attempt, each attempt is raced
    /// against it, and the sleep between attempts never extends past it. On
    /// expiry the last retryable error is wrapped in
    /// [`Error::DeadlineExceeded`].
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0u32;
        let mut delay = self.config.interval;
        let mut last_error: Option<Error> = None;

        loop {
            if self.deadline.is_expired() {
                return Err(Error::deadline_exceeded(operation_name, last_error));
            }
            attempt += 1;

            let outcome = tokio::time::timeout_at(self.deadline.instant(), operation()).await;
            match outcome {
                Err(_elapsed) => {
                    debug!(
                        operation = %operation_name,
                        attempt,
                        "Deadline fired while operation was in flight"
                    );
                    return Err(Error::deadline_exceeded(operation_name, last_error));
                }
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_retryable() => {
                    warn!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis(),
                        remaining_ms = self.deadline.remaining().as_millis(),
                        "Operation failed, retrying"
                    );
                    last_error = Some(e);
                }
                Ok(Err(e)) => return Err(e),
            }

            let wake = Instant::now()
                .checked_add(delay)
                .map_or(self.deadline.instant(), |t| t.min(self.deadline.instant()));
            tokio::time::sleep_until(wake).await;
            delay = self.config.next_delay(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn gate(timeout: Duration, interval: Duration) -> RetryGate {
        RetryGate::new(Deadline::after(timeout), RetryConfig::fixed(interval))
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let gate = gate(Duration::from_secs(5), Duration::from_millis(1));
        let result = gate.run("op", || async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.expect("should succeed"), 42);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let gate = gate(Duration::from_secs(5), Duration::from_millis(1));
        let result = gate
            .run("op", || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::transient("op", "connection refused"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("should succeed after retries"), 42);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let gate = gate(Duration::from_secs(5), Duration::from_millis(1));
        let result: Result<(), Error> = gate
            .run("op", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::malformed_template("pod-1", "missing pod.yaml"))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::MalformedTemplate { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_bounds_persistent_transient_failure() {
        let timeout = Duration::from_millis(300);
        let interval = Duration::from_millis(50);
        let gate = gate(timeout, interval);
        let start = Instant::now();

        let result: Result<(), Error> = gate
            .run("get configmap ns/pod-1", || async {
                Err(Error::transient("get configmap ns/pod-1", "service unavailable"))
            })
            .await;

        let elapsed = start.elapsed();
        match result {
            Err(Error::DeadlineExceeded {
                operation,
                last_error,
            }) => {
                assert_eq!(operation, "get configmap ns/pod-1");
                let last = last_error.expect("last error is kept");
                assert!(last.is_retryable());
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
        assert!(elapsed >= timeout, "gave up early: {elapsed:?}");
        assert!(
            elapsed <= timeout + interval + Duration::from_millis(100),
            "gave up late: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_hanging_attempt_is_cut_at_deadline() {
        let timeout = Duration::from_millis(100);
        let gate = gate(timeout, Duration::from_millis(10));
        let start = Instant::now();

        let result: Result<(), Error> = gate
            .run("op", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(Error::DeadlineExceeded {
                last_error: None,
                ..
            })
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_without_attempt() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let gate = RetryGate::new(
            Deadline::at(Instant::now() - Duration::from_millis(1)),
            RetryConfig::default(),
        );

        let result = gate
            .run("op", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(())
                }
            })
            .await;

        assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(86400 * 365));
    }

    #[tokio::test]
    async fn test_huge_interval_sleeps_only_until_deadline() {
        let timeout = Duration::from_millis(100);
        let gate = RetryGate::new(
            Deadline::after(timeout),
            RetryConfig::fixed(Duration::from_secs(u64::MAX)),
        );
        let start = Instant::now();

        let result: Result<(), Error> = gate
            .run("op", || async { Err(Error::transient("op", "connection refused")) })
            .await;

        assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
        assert!(start.elapsed() < timeout + Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_past_duration_range_falls_back_to_max() {
        let config = RetryConfig {
            interval: Duration::MAX,
            max_interval: Duration::MAX,
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.next_delay(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(300),
            backoff_multiplier: 2.0,
        };
        let d1 = config.next_delay(config.interval);
        let d2 = config.next_delay(d1);
        let d3 = config.next_delay(d2);
        assert_eq!(d1, Duration::from_millis(200));
        assert_eq!(d2, Duration::from_millis(300));
        assert_eq!(d3, Duration::from_millis(300));

        let fixed = RetryConfig::fixed(Duration::from_millis(50));
        assert_eq!(fixed.next_delay(fixed.interval), Duration::from_millis(50));
    }
}
