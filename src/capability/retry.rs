//! Bounded retry with exponential backoff around capability calls.

use crate::error::PipelineError;
use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Deadline for each individual attempt.
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or attempts run out.
/// Each attempt is bounded by `policy.call_timeout`; a timeout counts as transient.
pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::CapabilityTimeout {
                operation: operation.to_string(),
                timeout_ms: policy.call_timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient capability failure - retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = call_with_retry(&fast_policy(3), "search", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(PipelineError::CapabilityUnavailable("503".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = call_with_retry(&fast_policy(2), "search", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::CapabilityUnavailable("429".into()))
        })
        .await;

        assert!(matches!(result, Err(PipelineError::CapabilityUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = call_with_retry(&fast_policy(5), "extract", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::MalformedResponse("not json".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let mut policy = fast_policy(1);
        policy.call_timeout = Duration::from_millis(20);

        let result: Result<()> = call_with_retry(&policy, "extract", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(PipelineError::CapabilityTimeout { .. })));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(10));
    }
}
