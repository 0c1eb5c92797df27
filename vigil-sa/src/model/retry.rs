//! Bounded retry with exponential backoff for model calls
//!
//! Retries `Transient` and `Timeout` failures only; other failures are
//! terminal for the call and returned immediately.

use super::{ModelBackend, ModelError, ModelRequest};
use std::time::Duration;

/// Retry policy for external model calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum total attempts (first call included)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on the backoff delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Call the backend, retrying retryable failures with exponential backoff
///
/// **Algorithm:**
/// 1. Attempt the call
/// 2. On success, return the response
/// 3. On a retryable error with attempts remaining: log WARN, sleep
///    backoff, double backoff (capped), retry
/// 4. On a terminal error or exhausted attempts: return the error
pub async fn generate_with_retry(
    backend: &dyn ModelBackend,
    request: &ModelRequest,
    policy: &RetryPolicy,
) -> Result<String, ModelError> {
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(backend = backend.name(), attempt, "Retrying model call");
        }

        match backend.generate(request).await {
            Ok(response) => {
                if attempt > 1 {
                    tracing::debug!(
                        backend = backend.name(),
                        attempt,
                        "Model call succeeded after retry"
                    );
                }
                return Ok(response);
            }
            Err(err) => {
                if !err.is_retryable() || attempt >= policy.max_attempts {
                    return Err(err);
                }

                tracing::warn!(
                    backend = backend.name(),
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Model call failed, will retry after backoff"
                );

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyBackend {
        calls: AtomicU32,
        fail_first: u32,
        error: ModelError,
    }

    #[async_trait::async_trait]
    impl ModelBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn generate(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(self.error.clone())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let backend = FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 0,
            error: ModelError::Timeout,
        };
        let request = ModelRequest::text("hello");
        let result = generate_with_retry(&backend, &request, &fast_policy()).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let backend = FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error: ModelError::Transient("503".into()),
        };
        let request = ModelRequest::text("hello");
        let result = generate_with_retry(&backend, &request, &fast_policy()).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let backend = FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: ModelError::Timeout,
        };
        let request = ModelRequest::text("hello");
        let result = generate_with_retry(&backend, &request, &fast_policy()).await;
        assert!(matches!(result, Err(ModelError::Timeout)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_fails_immediately() {
        let backend = FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: ModelError::Auth("bad key".into()),
        };
        let request = ModelRequest::text("hello");
        let result = generate_with_retry(&backend, &request, &fast_policy()).await;
        assert!(matches!(result, Err(ModelError::Auth(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1, "should not retry");
    }
}
