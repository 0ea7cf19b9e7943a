//! Retry utilities for network operations with exponential backoff.
//!
//! HTTP enrichment sources talk to best-effort public APIs that routinely
//! time out or return 5xx under load. Transient failures are retried with
//! capped exponential backoff and jitter; everything else (validation
//! errors, parse errors, rate-limit denials) surfaces immediately.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::errors::{Result, VendorScopeError};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries (for exponential backoff)
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,

    /// Maximum total time to spend retrying
    pub max_total_duration: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            max_total_duration: Some(Duration::from_secs(60)),
        }
    }
}

/// Policy for determining if an operation should be retried
pub trait RetryPolicy: Sync {
    /// Returns true if the operation should be retried for this error
    fn should_retry(&self, error: &VendorScopeError, attempt: u32) -> bool;
}

/// Retries transient Network-category failures only.
///
/// Rate-limit denials are explicitly excluded: the window is closed and the
/// limiter has already paused as long as it is allowed to.
pub struct TransientNetworkPolicy;

impl RetryPolicy for TransientNetworkPolicy {
    fn should_retry(&self, error: &VendorScopeError, _attempt: u32) -> bool {
        error.is_retryable()
    }
}

/// Retry executor that handles the retry logic
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry executor with default configuration
    pub fn with_default_config() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Execute an async operation, retrying per `policy` with exponential
    /// backoff. `name` only labels log lines.
    pub async fn execute<F, Fut, T>(
        &self,
        name: &str,
        operation: F,
        policy: &dyn RetryPolicy,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let start_time = Instant::now();
        let mut delay = self.config.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    let budget_spent = self
                        .config
                        .max_total_duration
                        .map(|max| start_time.elapsed() >= max)
                        .unwrap_or(false);

                    if attempt >= self.config.max_attempts
                        || budget_spent
                        || !policy.should_retry(&error, attempt)
                    {
                        return Err(error);
                    }

                    let actual_delay = if self.config.jitter {
                        add_jitter(delay)
                    } else {
                        delay
                    };
                    debug!(
                        operation = name,
                        attempt = attempt + 1,
                        delay_ms = actual_delay.as_millis() as u64,
                        error = %error,
                        "retrying after transient failure"
                    );
                    sleep(actual_delay).await;

                    delay = std::cmp::min(
                        Duration::from_millis(
                            (delay.as_millis() as f64 * self.config.backoff_multiplier) as u64,
                        ),
                        self.config.max_delay,
                    );
                    attempt += 1;
                }
            }
        }
    }
}

/// Add random jitter to prevent thundering herd problems
fn add_jitter(delay: Duration) -> Duration {
    use rand::Rng;

    let jitter_range = delay.as_millis() as f64 * 0.1; // 10% jitter
    let mut rng = rand::rng();
    let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);

    let jittered_ms = (delay.as_millis() as f64 + jitter).max(0.0) as u64;
    Duration::from_millis(jittered_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
            max_total_duration: None,
        }
    }

    #[tokio::test]
    async fn success_needs_one_attempt() {
        let executor = RetryExecutor::new(quick_config(3));
        let calls = AtomicU32::new(0);
        let result = executor
            .execute(
                "op",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, VendorScopeError>(42)
                },
                &TransientNetworkPolicy,
            )
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_until_success() {
        let executor = RetryExecutor::new(quick_config(3));
        let calls = AtomicU32::new(0);
        let result = executor
            .execute(
                "op",
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(VendorScopeError::dns_timeout("example.com", 5))
                    } else {
                        Ok("done")
                    }
                },
                &TransientNetworkPolicy,
            )
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let executor = RetryExecutor::new(quick_config(2));
        let calls = AtomicU32::new(0);
        let result: Result<()> = executor
            .execute(
                "op",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(VendorScopeError::dns_timeout("example.com", 5))
                },
                &TransientNetworkPolicy,
            )
            .await;
        assert!(result.is_err());
        // Initial attempt + 2 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limit_is_never_retried() {
        let executor = RetryExecutor::new(quick_config(5));
        let calls = AtomicU32::new(0);
        let result: Result<()> = executor
            .execute(
                "op",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(VendorScopeError::rate_limited("crt.sh"))
                },
                &TransientNetworkPolicy,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn input_errors_are_never_retried() {
        let executor = RetryExecutor::new(quick_config(5));
        let calls = AtomicU32::new(0);
        let result: Result<()> = executor
            .execute(
                "op",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(VendorScopeError::invalid_domain("x", "too short"))
                },
                &TransientNetworkPolicy,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
