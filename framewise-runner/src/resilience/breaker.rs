//! Circuit breaker
//!
//! ```text
//! CLOSED    --threshold qualifying failures-->  OPEN
//! OPEN      --first call after recovery-->      HALF_OPEN
//! HALF_OPEN --probe succeeds-->                 CLOSED
//! HALF_OPEN --probe fails (qualifying)-->       OPEN
//! ```
//!
//! OPEN to HALF_OPEN happens lazily inside [`CircuitBreaker::try_acquire`];
//! nothing runs in the background. State lives behind a std mutex that is
//! only held for bookkeeping, never across an await.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive qualifying failures that open the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is allowed
    pub recovery_timeout: Duration,
    /// Probes admitted at once while half-open
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

/// Call refused without invoking the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    pub retry_after: Duration,
}

/// Point-in-time view for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Seconds until an OPEN breaker admits a probe
    pub time_until_retry: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    half_open_calls: u32,
    admitted: u64,
    rejected: u64,
    succeeded: u64,
    failed: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_at: None,
                half_open_calls: 0,
                admitted: 0,
                rejected: 0,
                succeeded: 0,
                failed: 0,
            }),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remaining(&self, inner: &Inner, now: Instant) -> Duration {
        inner
            .last_failure
            .map(|at| self.config.recovery_timeout.saturating_sub(now.duration_since(at)))
            .unwrap_or(Duration::ZERO)
    }

    /// Ask to make one protected call
    ///
    /// The returned [`Permit`] must be resolved with [`Permit::succeed`] or
    /// [`Permit::fail`]. Dropping it unresolved gives back a probe slot.
    pub fn try_acquire(&self) -> Result<Permit<'_>, Rejected> {
        let mut inner = self.lock();
        let now = Instant::now();

        if inner.state == BreakerState::Open && self.remaining(&inner, now).is_zero() {
            inner.state = BreakerState::HalfOpen;
            inner.half_open_calls = 0;
            info!("Circuit breaker half-open, admitting probe");
        }

        match inner.state {
            BreakerState::Closed => {
                inner.admitted += 1;
                Ok(Permit::new(self, false))
            }
            BreakerState::HalfOpen if inner.half_open_calls < self.config.half_open_max_calls => {
                inner.half_open_calls += 1;
                inner.admitted += 1;
                Ok(Permit::new(self, true))
            }
            BreakerState::HalfOpen => {
                inner.rejected += 1;
                Err(Rejected {
                    retry_after: self.config.recovery_timeout,
                })
            }
            BreakerState::Open => {
                inner.rejected += 1;
                Err(Rejected {
                    retry_after: self.remaining(&inner, now),
                })
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        inner.succeeded += 1;
        match inner.state {
            BreakerState::HalfOpen if probe => {
                inner.state = BreakerState::Closed;
                inner.failure_count = 0;
                inner.half_open_calls = 0;
                info!("Circuit breaker closed after successful probe");
            }
            BreakerState::Closed => inner.failure_count = 0,
            // Admitted before the circuit opened; it proves nothing now and
            // must not settle an unresolved probe
            BreakerState::HalfOpen | BreakerState::Open => {}
        }
    }

    fn on_failure(&self, probe: bool, qualifying: bool) {
        let mut inner = self.lock();

        if !qualifying {
            if probe {
                release_probe(&mut inner);
            }
            return;
        }

        inner.failed += 1;
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.half_open_calls = 0;
                warn!("Circuit breaker re-opened: probe failed");
            }
            BreakerState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.state = BreakerState::Open;
                warn!(
                    "Circuit breaker opened after {} consecutive failures",
                    inner.failure_count
                );
            }
            _ => {}
        }
    }

    fn on_abandon(&self) {
        release_probe(&mut self.lock());
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Read-only view; does not perform the lazy OPEN to HALF_OPEN move
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let time_until_retry = match inner.state {
            BreakerState::Open => self.remaining(&inner, Instant::now()).as_secs(),
            _ => 0,
        };

        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            last_failure_time: inner.last_failure_at,
            time_until_retry,
            admitted: inner.admitted,
            rejected: inner.rejected,
            succeeded: inner.succeeded,
            failed: inner.failed,
        }
    }
}

fn release_probe(inner: &mut Inner) {
    if inner.state == BreakerState::HalfOpen {
        inner.half_open_calls = inner.half_open_calls.saturating_sub(1);
    }
}

/// Admission ticket for one protected call
#[derive(Debug)]
#[must_use = "a permit must be resolved with succeed() or fail()"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            resolved: false,
        }
    }

    /// Whether this call is a half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.probe);
    }

    /// Record a failure; only `qualifying` failures move the breaker
    pub fn fail(mut self, qualifying: bool) {
        self.resolved = true;
        self.breaker.on_failure(self.probe, qualifying);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.probe {
            self.breaker.on_abandon();
        }
    }
}
