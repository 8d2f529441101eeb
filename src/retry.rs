//! Bounded retry for backing store calls
//!
//! Attempts are strictly sequential: attempt N+1 starts only after attempt
//! N's failure has been observed. Only [`DataStoreError::Transient`] is
//! retried; `NotFound` and `InvalidValue` are returned immediately.

use crate::datastore::DataStoreError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Immediate re-attempt up to `attempts`
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }
}

/// Run `op` until it succeeds, fails non-transiently, or attempts run out.
///
/// Every failed attempt is logged with its attempt count.
pub async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    target: &str,
    mut op: F,
) -> Result<T, DataStoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DataStoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e @ DataStoreError::Transient(_)) => {
                warn!(
                    operation,
                    target,
                    attempt,
                    max_attempts = policy.attempts,
                    error = %e,
                    "store call failed"
                );
                if attempt >= policy.attempts {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
        attempt += 1;
        if !policy.backoff.is_zero() {
            tokio::time::sleep(policy.backoff).await;
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
        let result = with_retries(RetryPolicy::immediate(5), "get", "Wins", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DataStoreError::Transient("busy".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retries(RetryPolicy::immediate(4), "set", "Items", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DataStoreError::Transient("down".into()))
            })
            .await;

        assert!(matches!(result, Err(DataStoreError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retries(RetryPolicy::immediate(5), "get", "Wins", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DataStoreError::NotFound("Player_1".into()))
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::immediate(0).attempts, 1);
    }
}
