//! Consecutive-failure breaker guarding each provider adapter.
//!
//! After `failure_threshold` failed calls in a row the breaker opens and every
//! call fails fast until `open_timeout` has passed; the next call is then let
//! through as a trial call. A successful trial call closes the breaker, a
//! failed one reopens it for another full timeout.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    provider: ProviderId,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Admits a call, or returns how long the breaker stays open.
    pub fn check(&self) -> Result<(), Duration> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened_at| opened_at.elapsed())
                    .unwrap_or(self.config.open_timeout);

                if elapsed >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at = None;
                    Ok(())
                } else {
                    Err(self.config.open_timeout - elapsed)
                }
            }
        }
    }

    /// Time left before an open breaker admits a trial call. Unlike [`check`],
    /// this never moves the breaker to half-open.
    ///
    /// [`check`]: Self::check
    pub fn open_for(&self) -> Option<Duration> {
        let inner = self.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let elapsed = inner
            .opened_at
            .map(|opened_at| opened_at.elapsed())
            .unwrap_or(self.config.open_timeout);
        self.config
            .open_timeout
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_open = inner.state == CircuitState::HalfOpen
            || (inner.state == CircuitState::Closed
                && inner.consecutive_failures >= self.config.failure_threshold);
        if should_open {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                provider = %self.provider,
                failures = inner.consecutive_failures,
                open_for_secs = self.config.open_timeout.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner
            .lock()
            .expect("circuit breaker lock is not poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, open_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            ProviderId::Yahoo,
            CircuitBreakerConfig {
                failure_threshold,
                open_timeout,
            },
        )
    }

    #[test]
    fn opens_after_threshold_failures_and_reports_remaining_time() {
        let breaker = breaker(2, Duration::from_secs(30));

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let remaining = breaker.check().expect_err("open breaker rejects calls");
        assert!(remaining > Duration::from_secs(29));
    }

    #[test]
    fn open_for_peeks_without_admitting_a_trial_call() {
        let open = breaker(1, Duration::from_secs(30));
        assert_eq!(open.open_for(), None);

        open.record_failure();
        let remaining = open.open_for().expect("breaker is open");
        assert!(remaining > Duration::from_secs(29));
        assert_eq!(open.state(), CircuitState::Open);

        let expired = breaker(1, Duration::from_millis(1));
        expired.record_failure();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(expired.open_for(), None);
        assert_eq!(expired.state(), CircuitState::Open);
    }

    #[test]
    fn failed_trial_call_reopens_immediately() {
        let breaker = breaker(3, Duration::from_millis(1));
        for _ in 0..3 {
            breaker.record_failure();
        }

        std::thread::sleep(Duration::from_millis(2));
        assert!(breaker.check().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn successful_trial_call_closes_and_resets() {
        let breaker = breaker(1, Duration::from_millis(1));
        breaker.record_failure();

        std::thread::sleep(Duration::from_millis(2));
        assert!(breaker.check().is_ok());
        breaker.record_success();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }
}
