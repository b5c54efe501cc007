//! Resilience layer for calls into an unreliable dependency
//!
//! A [`CircuitBreaker`] sits outside a retry loop driven by [`RetryPolicy`].
//! One protected call is one breaker outcome no matter how many attempts the
//! retry loop made, and each attempt carries a hard timeout.
//!
//! Errors from the dependency decide their own fate through [`Failure`]:
//!
//! | Kind        | Retried | Counts toward breaker |
//! |-------------|---------|-----------------------|
//! | `Transient` | yes     | yes                   |
//! | `Upstream`  | no      | yes                   |
//! | `Caller`    | no      | no                    |

mod breaker;
mod retry;

pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, Permit, Rejected};
pub use retry::RetryPolicy;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

/// How a dependency error should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// May clear up on its own: timeouts, 5xx, transport drops, rate limits
    Transient,
    /// The dependency is at fault but repeating the call will not help
    Upstream,
    /// The request itself was bad; says nothing about dependency health
    Caller,
}

/// Classification hook implemented by a dependency's error type
pub trait Failure: std::error::Error + Send + Sync + 'static {
    fn kind(&self) -> FailureKind;

    /// Error to report when an attempt exceeded the call timeout
    fn timeout(limit: Duration) -> Self
    where
        Self: Sized;
}

#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    /// The breaker refused the call; the operation was never invoked
    #[error("circuit open, retry after {}s", .retry_after.as_secs())]
    CircuitOpen { retry_after: Duration },

    /// The dependency's own error after `attempts` tries
    #[error("failed after {attempts} attempt(s): {source}")]
    Operation {
        attempts: u32,
        #[source]
        source: E,
    },
}

/// Successful value and the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Circuit breaker plus retry around a single dependency
#[derive(Clone)]
pub struct ResilientCaller {
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

impl ResilientCaller {
    pub fn new(breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self { breaker, policy }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` under the breaker, retrying transient failures
    ///
    /// `operation` is called once per attempt. Dropping the returned future
    /// mid-call releases any half-open probe slot it held.
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut operation: F,
    ) -> Result<Attempted<T>, ResilienceError<E>>
    where
        E: Failure,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self
            .breaker
            .try_acquire()
            .map_err(|rejected| ResilienceError::CircuitOpen {
                retry_after: rejected.retry_after,
            })?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.policy.call_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(E::timeout(self.policy.call_timeout)),
            };

            match result {
                Ok(value) => {
                    permit.succeed();
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    let kind = error.kind();
                    if kind == FailureKind::Transient && attempt < max_attempts {
                        let delay = self.policy.delay_for_attempt(attempt);
                        warn!(
                            "Attempt {}/{} failed: {}. Retrying in {:?}",
                            attempt, max_attempts, error, delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    debug!("Giving up after {} attempt(s): {}", attempt, error);
                    permit.fail(kind != FailureKind::Caller);
                    return Err(ResilienceError::Operation {
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, thiserror::Error)]
    enum FakeError {
        #[error("timed out")]
        Timeout,
        #[error("bad gateway")]
        BadGateway,
        #[error("forbidden")]
        Forbidden,
        #[error("bad input")]
        BadInput,
    }

    impl Failure for FakeError {
        fn kind(&self) -> FailureKind {
            match self {
                FakeError::Timeout | FakeError::BadGateway => FailureKind::Transient,
                FakeError::Forbidden => FailureKind::Upstream,
                FakeError::BadInput => FailureKind::Caller,
            }
        }

        fn timeout(_limit: Duration) -> Self {
            FakeError::Timeout
        }
    }

    fn caller(threshold: u32) -> ResilientCaller {
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            ..Default::default()
        }));
        ResilientCaller::new(breaker, RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success_counts_once() {
        let caller = caller(5);
        let calls = AtomicU32::new(0);

        let outcome = caller
            .execute(|| async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(FakeError::BadGateway),
                    _ => Ok("done"),
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, Attempted { value: "done", attempts: 2 });
        let snapshot = caller.breaker().snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_one_breaker_failure() {
        let caller = caller(5);
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let err = caller
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FakeError::Timeout)
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResilienceError::Operation {
                attempts: 3,
                source: FakeError::Timeout
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(caller.breaker().snapshot().failure_count, 1);
        // Backoff waited 2s then 4s
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_hits_call_timeout() {
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
        let caller = ResilientCaller::new(
            breaker,
            RetryPolicy {
                max_attempts: 1,
                call_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        );

        let err = caller
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<(), FakeError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResilienceError::Operation {
                attempts: 1,
                source: FakeError::Timeout
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_failures_are_not_retried() {
        let caller = caller(5);

        for (error, counted) in [(FakeError::Forbidden, 1), (FakeError::BadInput, 1)] {
            let calls = AtomicU32::new(0);
            let err = caller
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(error.clone())
                })
                .await
                .unwrap_err();

            assert!(matches!(err, ResilienceError::Operation { attempts: 1, .. }));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            // Only the upstream failure counted; the caller error left it alone
            assert_eq!(caller.breaker().snapshot().failure_count, counted);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_never_invokes_operation() {
        let caller = caller(2);
        for _ in 0..2 {
            let _ = caller
                .execute(|| async { Err::<(), _>(FakeError::Forbidden) })
                .await;
        }
        assert_eq!(caller.breaker().snapshot().state, BreakerState::Open);

        let calls = AtomicU32::new(0);
        for _ in 0..10 {
            let err = caller
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), FakeError>(())
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ResilienceError::CircuitOpen { .. }));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(caller.breaker().snapshot().rejected, 10);
    }
}
