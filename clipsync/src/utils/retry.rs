//! Retry helper with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tokio::time::sleep;
use tracing::debug;

use crate::Result;

/// Backoff policy for retryable operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 5s, 15s, 45s... capped at 90s.
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(5),
            factor: 3.0,
            max_delay: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        // Small +/- 10% jitter so overlapping invocations spread out.
        let jitter = capped * 0.1;
        let jittered = capped + rand::rng().random_range(-jitter..=jitter);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted;
/// returns the last error.
pub async fn retry_with_backoff<T, F, Fut>(
    op_name: &'static str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.attempts {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt - 1);
                debug!(
                    "{op_name} failed ({err}), retrying in {delay:?} (attempt {attempt}/{})",
                    policy.attempts
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retrying() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::with_attempts(3);
        let out = retry_with_backoff("op", &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(7) }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            factor: 1.0,
            max_delay: Duration::from_millis(2),
        };
        let err = retry_with_backoff("op", &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::Other("nope".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
