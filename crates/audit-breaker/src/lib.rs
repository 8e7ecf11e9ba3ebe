#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-breaker** – Three-state circuit breaker for the batch worker's
//! store writes (spec §4.4).
//!
//! `closed` → failures accumulate; reaching `failure_threshold` flips to
//! `open` with a not-before timestamp. `open` short-circuits until the
//! not-before passes, then the next call transitions to `half_open`.
//! Success in `half_open` returns to `closed`; failure re-opens.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are short-circuited until the not-before instant passes.
    Open,
    /// A single probe call is permitted to decide the next state.
    HalfOpen,
}

/// Error returned when a call is short-circuited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BreakerError {
    /// The breaker is open; the call was not attempted.
    #[error("circuit open")]
    Open,
    /// The breaker is half-open and already has a probe in flight.
    #[error("circuit half-open, probe already in flight")]
    ProbeInFlight,
}

struct Inner {
    state: BreakerState,
    failures: u32,
    not_before: Option<Instant>,
    probe_in_flight: bool,
}

/// A guard returned by `CircuitBreaker::try_acquire`. The caller must report
/// the outcome of its call via `on_success`/`on_failure` exactly once.
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
}

impl<'a> CallPermit<'a> {
    /// Report that the guarded call succeeded.
    pub async fn on_success(self) {
        self.breaker.record_success().await;
    }

    /// Report that the guarded call failed.
    pub async fn on_failure(self) {
        self.breaker.record_failure().await;
    }
}

/// A three-state circuit breaker.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    open_duration: Duration,
}

impl CircuitBreaker {
    /// Construct a breaker that opens after `failure_threshold` consecutive
    /// failures and stays open for `open_duration`.
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                not_before: None,
                probe_in_flight: false,
            }),
            failure_threshold,
            open_duration,
        }
    }

    /// Current observable state.
    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    /// Attempt to acquire permission to make a guarded call. Returns a
    /// permit that must be resolved with `on_success`/`on_failure`, or a
    /// `BreakerError` if the call should be short-circuited.
    pub async fn try_acquire(&self) -> Result<CallPermit<'_>, BreakerError> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            BreakerState::Closed => Ok(CallPermit { breaker: self }),
            BreakerState::Open => {
                let now = Instant::now();
                if inner.not_before.map(|nb| now >= nb).unwrap_or(true) {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!("circuit breaker transitioning to half-open, admitting probe call");
                    Ok(CallPermit { breaker: self })
                } else {
                    Err(BreakerError::Open)
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(BreakerError::ProbeInFlight)
                } else {
                    inner.probe_in_flight = true;
                    Ok(CallPermit { breaker: self })
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => {
                inner.failures = 0;
            }
            BreakerState::HalfOpen => {
                info!("circuit breaker probe succeeded, closing");
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.not_before = None;
                inner.probe_in_flight = false;
            }
            BreakerState::Open => {
                // A success can only be reported here if the caller raced
                // ahead of a state transition; treat it as closing.
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.not_before = None;
            }
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                debug!(failures = inner.failures, threshold = self.failure_threshold, "store failure recorded");
                if inner.failures >= self.failure_threshold {
                    warn!(failures = inner.failures, "circuit breaker opening");
                    inner.state = BreakerState::Open;
                    inner.not_before = Some(Instant::now() + self.open_duration);
                }
            }
            BreakerState::HalfOpen => {
                warn!("circuit breaker probe failed, re-opening");
                inner.state = BreakerState::Open;
                inner.not_before = Some(Instant::now() + self.open_duration);
                inner.probe_in_flight = false;
            }
            BreakerState::Open => {
                // Already open; nothing to do besides refreshing the timer
                // would be surprising to callers, so leave not_before as-is.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_allows_calls_and_counts_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
        for _ in 0..2 {
            let permit = breaker.try_acquire().await.unwrap();
            permit.on_failure().await;
        }
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_and_short_circuits() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(50));
        for _ in 0..2 {
            let permit = breaker.try_acquire().await.unwrap();
            permit.on_failure().await;
        }
        assert_eq!(breaker.state().await, BreakerState::Open);
        assert_eq!(breaker.try_acquire().await.unwrap_err(), BreakerError::Open);
    }

    #[tokio::test]
    async fn half_open_probe_then_close_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        let permit = breaker.try_acquire().await.unwrap();
        permit.on_failure().await;
        assert_eq!(breaker.state().await, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let probe = breaker.try_acquire().await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);
        // a second concurrent probe must be refused
        assert_eq!(breaker.try_acquire().await.unwrap_err(), BreakerError::ProbeInFlight);

        probe.on_success().await;
        assert_eq!(breaker.state().await, BreakerState::Closed);

        // closed breaker resets failure counter on success
        let permit = breaker.try_acquire().await.unwrap();
        permit.on_success().await;
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        let permit = breaker.try_acquire().await.unwrap();
        permit.on_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let probe = breaker.try_acquire().await.unwrap();
        probe.on_failure().await;
        assert_eq!(breaker.state().await, BreakerState::Open);
    }
}
