//! In-process circuit breaker.
//!
//! One instance guards one advisory endpoint. State lives behind a std
//! `Mutex`; every operation is a short critical section with no awaits.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::ports::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
    total_successes: u64,
    total_failures: u64,
    times_opened: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            opened_at: None,
            total_successes: 0,
            total_failures: 0,
            times_opened: 0,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        self.times_opened += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        self.opened_at = None;
    }
}

/// Circuit breaker whose state is local to this process.
#[derive(Debug)]
pub struct InMemoryCircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl InMemoryCircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves Open to HalfOpen once the cooldown has elapsed.
    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
        if elapsed >= self.config.cooldown {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_successes = 0;
            inner.half_open_in_flight = 0;
            tracing::info!(breaker = %self.name, "Circuit half-open, probing");
        }
    }

    fn remaining_cooldown(&self, inner: &BreakerState) -> Option<Duration> {
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => Some(self.config.cooldown.saturating_sub(at.elapsed())),
            _ => None,
        }
    }
}

impl CircuitBreaker for InMemoryCircuitBreaker {
    fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    fn should_allow(&self) -> bool {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_requests {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.close();
                    tracing::info!(breaker = %self.name, "Circuit closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.open();
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.open();
                tracing::warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    fn reset(&self) {
        self.lock().close();
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        CircuitBreakerMetrics {
            state: Some(inner.state),
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            times_opened: inner.times_opened,
            current_failures: inner.consecutive_failures,
            time_until_half_open: self.remaining_cooldown(&inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown: Duration) -> InMemoryCircuitBreaker {
        InMemoryCircuitBreaker::new(
            "openai:gpt",
            CircuitBreakerConfig::for_advisory_source(threshold, cooldown),
        )
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = breaker(2, Duration::from_secs(60));
        assert!(cb.should_allow());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());
        let metrics = cb.metrics();
        assert_eq!(metrics.times_opened, 1);
        assert!(metrics.time_until_half_open.is_some());
    }

    #[test]
    fn success_resets_failure_streak() {
        let cb = breaker(2, Duration::from_secs(60));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_cooldown_allows_single_trial() {
        let cb = breaker(1, Duration::ZERO);
        cb.record_failure();

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.should_allow());
        assert!(!cb.should_allow());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn failed_trial_reopens() {
        let cb = InMemoryCircuitBreaker::new(
            "ollama:llama3",
            CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_millis(20),
                success_threshold: 1,
                half_open_max_requests: 1,
            },
        );
        cb.record_failure();
        assert!(!cb.should_allow());

        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.should_allow());
        cb.record_failure();

        assert!(!cb.should_allow());
        assert_eq!(cb.metrics().times_opened, 2);
    }

    #[test]
    fn reset_closes() {
        let cb = breaker(1, Duration::from_secs(60));
        cb.record_failure();
        cb.reset();
        assert!(cb.should_allow());
        assert_eq!(cb.name(), "openai:gpt");
    }
}
