//! CircuitBreaker port - cooldown-on-failure guard for advisory endpoints.
//!
//! ```text
//! Closed   --[failure_threshold consecutive failures]--> Open
//! Open     --[cooldown elapsed]--------------------------> HalfOpen
//! HalfOpen --[success_threshold successes]---------------> Closed
//! HalfOpen --[any failure]-------------------------------> Open
//! ```

use std::time::Duration;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow through.
    Closed,

    /// Requests are rejected without calling the endpoint until the cooldown ends.
    Open,

    /// Trial requests are let through to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn allows_requests(&self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,

    /// Time spent open before probing.
    pub cooldown: Duration,

    /// Successes in half-open needed to close.
    pub success_threshold: u32,

    /// Concurrent trial calls allowed while half-open.
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 1,
            half_open_max_requests: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Settings for an advisory endpoint: trip fast, cool down, close on the first good trial call.
    pub fn for_advisory_source(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            success_threshold: 1,
            half_open_max_requests: 1,
        }
    }
}

/// Port for circuit breaker functionality.
///
/// Callers ask `should_allow` before the call and report the result with
/// `record_success` or `record_failure` afterwards.
pub trait CircuitBreaker: Send + Sync {
    fn state(&self) -> CircuitState;

    /// `false` while open. In half-open, limits concurrent trial calls.
    fn should_allow(&self) -> bool;

    fn record_success(&self);

    fn record_failure(&self);

    /// Force the circuit closed.
    fn reset(&self);

    fn metrics(&self) -> CircuitBreakerMetrics;
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerMetrics {
    pub state: Option<CircuitState>,
    pub total_successes: u64,
    pub total_failures: u64,
    pub times_opened: u64,
    pub current_failures: u32,
    pub time_until_half_open: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_state_allows_requests() {
        assert!(CircuitState::Closed.allows_requests());
        assert!(CircuitState::HalfOpen.allows_requests());
        assert!(!CircuitState::Open.allows_requests());
    }

    #[test]
    fn advisory_config_clamps_threshold() {
        let config = CircuitBreakerConfig::for_advisory_source(0, Duration::from_secs(45));
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.cooldown, Duration::from_secs(45));
    }
}
