use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::config::RetryConfig;
use crate::core::error::StorageError;
use crate::observability::metrics as obs;

// ---------------------------------------------------------------------------
// Retry constants
// ---------------------------------------------------------------------------

/// Attempts per listing when nothing else is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate = fn(&StorageError) -> bool;

/// Treat every error as transient.
pub fn retry_any(_: &StorageError) -> bool {
    true
}

/// Retry unless the backend marked the error as terminal.
pub fn retry_transient(err: &StorageError) -> bool {
    err.is_retryable()
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry for idempotent reads.
///
/// Each attempt reruns the whole operation, so partial results from a failed
/// attempt are never observed. Backoff doubles per retry starting at
/// `initial_backoff`, capped at `max_backoff`; a zero initial backoff retries
/// immediately.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub retryable: RetryPredicate,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(1),
            retryable: retry_transient,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            retryable: if config.retry_all_errors {
                retry_any
            } else {
                retry_transient
            },
        }
    }

    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        if self.initial_backoff.is_zero() || retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. On exhaustion the error from
    /// the final attempt is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StorageError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    obs::inc_listing_attempt("success");
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    obs::inc_listing_attempt("failure");
                    if !(self.retryable)(&e) {
                        warn!(operation, attempt, error = %e, "terminal error, not retrying");
                        return Err(e);
                    }
                    if attempt >= max_attempts {
                        warn!(operation, attempt, error = %e, "retries exhausted");
                        return Err(e);
                    }

                    let backoff = self.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    obs::inc_listing_retries();
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(StorageError::transient("p", format!("fail {attempt}")))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let err = policy
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(StorageError::transient("p", format!("fail {attempt}"))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(err.to_string().contains("fail 5"));
    }

    #[tokio::test]
    async fn test_terminal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let err = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StorageError::terminal("p", "AccessDenied")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_retry_any_ignores_classification() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_predicate(retry_any);

        let _ = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StorageError::terminal("p", "AccessDenied")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_zero_backoff_by_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::ZERO);
        assert_eq!(policy.backoff_for(4), Duration::ZERO);
    }

    #[test]
    fn test_from_config_clamps_attempts() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            retry_all_errors: false,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_backoff, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_retry_all_errors_config_retries_terminal_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            retry_all_errors: true,
            ..RetryConfig::default()
        });

        let err = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StorageError::terminal("p", "NoSuchBucket")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("NoSuchBucket"));
    }
}
