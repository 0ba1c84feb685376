use crate::types::CircuitState;
use std::time::Duration;
use tokio::time::Instant;

/// A transition the breaker just made, for logging by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the transition.
    pub from: CircuitState,
    /// State after the transition.
    pub to: CircuitState,
}

/// Per-worker circuit breaker.
///
/// Pure state machine: every method takes `now` and returns the transition it
/// made, if any. The health monitor owns one per worker and serialises access.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Closed breaker with no recorded failures.
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Current position.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// When the breaker last opened, while open or half-open.
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Record a successful interaction.
    pub fn record_success(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        match self.state {
            CircuitState::HalfOpen => {
                self.opened_at = None;
                Some(self.move_to(CircuitState::Closed))
            }
            // Only a half-open probe can close an open circuit.
            CircuitState::Open | CircuitState::Closed => None,
        }
    }

    /// Record a failed interaction.
    pub fn record_failure(&mut self, failure_threshold: u32, now: Instant) -> Option<Transition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            CircuitState::Closed if self.consecutive_failures >= failure_threshold => {
                self.opened_at = Some(now);
                Some(self.move_to(CircuitState::Open))
            }
            CircuitState::HalfOpen => {
                self.opened_at = Some(now);
                Some(self.move_to(CircuitState::Open))
            }
            CircuitState::Closed | CircuitState::Open => None,
        }
    }

    /// Move `Open → HalfOpen` once the test interval has elapsed.
    pub fn evaluate(&mut self, test_interval: Duration, now: Instant) -> Option<Transition> {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened)) if now.duration_since(opened) >= test_interval => {
                Some(self.move_to(CircuitState::HalfOpen))
            }
            _ => None,
        }
    }

    /// Whether a call may be attempted right now.
    pub fn allows_traffic(&self, test_interval: Duration, now: Instant) -> bool {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened)) => now.duration_since(opened) >= test_interval,
            (CircuitState::Open, None) => false,
            _ => true,
        }
    }

    /// Clear failure history and close the circuit.
    pub fn reset(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        self.opened_at = None;
        if self.state == CircuitState::Closed {
            None
        } else {
            Some(self.move_to(CircuitState::Closed))
        }
    }

    fn move_to(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
