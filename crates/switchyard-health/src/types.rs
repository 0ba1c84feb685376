use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchyard_core::HealthScoringConfig;

/// Health status of a worker, derived from its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Score at or above the degraded threshold.
    Healthy,
    /// Score between the unhealthy and degraded thresholds.
    Degraded,
    /// Score between the dead and unhealthy thresholds.
    Unhealthy,
    /// Score below the dead threshold.
    Dead,
    /// A remediation is currently in flight for this worker.
    Recovering,
}

impl WorkerStatus {
    /// Map a score onto a status using the configured thresholds.
    pub fn from_score(score: f64, thresholds: &HealthScoringConfig) -> Self {
        if score >= thresholds.degraded_threshold {
            WorkerStatus::Healthy
        } else if score >= thresholds.unhealthy_threshold {
            WorkerStatus::Degraded
        } else if score >= thresholds.dead_threshold {
            WorkerStatus::Unhealthy
        } else {
            WorkerStatus::Dead
        }
    }

    /// Degraded, Unhealthy and Dead workers are candidates for recovery.
    pub fn needs_attention(self) -> bool {
        matches!(
            self,
            WorkerStatus::Degraded | WorkerStatus::Unhealthy | WorkerStatus::Dead
        )
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Healthy => write!(f, "healthy"),
            WorkerStatus::Degraded => write!(f, "degraded"),
            WorkerStatus::Unhealthy => write!(f, "unhealthy"),
            WorkerStatus::Dead => write!(f, "dead"),
            WorkerStatus::Recovering => write!(f, "recovering"),
        }
    }
}

/// Circuit breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Traffic flows.
    Closed,
    /// Traffic and checks are refused until the test interval passes.
    Open,
    /// The next interaction decides between closed and open.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// One observed interaction with a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    /// Whether the call succeeded.
    pub success: bool,
    /// Observed latency, if measured.
    pub latency: Option<std::time::Duration>,
    /// Error code for failures.
    pub error_kind: Option<switchyard_core::ErrorKind>,
}

impl Interaction {
    /// Successful interaction with its latency.
    pub fn success(latency: std::time::Duration) -> Self {
        Self {
            success: true,
            latency: Some(latency),
            error_kind: None,
        }
    }

    /// Failed interaction of the given kind.
    pub fn failure(error_kind: switchyard_core::ErrorKind) -> Self {
        Self {
            success: false,
            latency: None,
            error_kind: Some(error_kind),
        }
    }

    /// Attach a latency to a failure.
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// Read-only snapshot of a worker's health, safe to hand to other components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealth {
    /// Worker id.
    pub worker_id: String,
    /// Category, once the worker is registered.
    pub category: Option<String>,
    /// Endpoint, once the worker is registered.
    pub endpoint: Option<String>,
    /// Health score in `0..=100`.
    pub score: f64,
    /// Reported status; `recovering` while a remediation runs.
    pub status: WorkerStatus,
    /// Circuit breaker position.
    pub circuit_state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Liveness checks that passed.
    pub heartbeat_successes: u64,
    /// Liveness checks that failed or cycles with a missed heartbeat.
    pub heartbeat_failures: u64,
    /// Successful interactions and checks.
    pub success_count: u64,
    /// Failed interactions and checks.
    pub error_count: u64,
    /// Failures that were timeouts.
    pub timeout_count: u64,
    /// Mean latency over the window.
    pub avg_latency_ms: Option<f64>,
    /// 95th percentile latency over the window.
    pub p95_latency_ms: Option<f64>,
    /// Remediations started for this worker.
    pub recovery_attempts: u32,
    /// True while a remediation is in flight.
    pub recovering: bool,
    /// Last successful contact.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Count of workers per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Known workers.
    pub total: usize,
    /// Workers reported healthy.
    pub healthy: usize,
    /// Workers reported degraded.
    pub degraded: usize,
    /// Workers reported unhealthy.
    pub unhealthy: usize,
    /// Workers reported dead.
    pub dead: usize,
    /// Workers under remediation.
    pub recovering: usize,
    /// Workers whose circuit is open.
    pub open_circuits: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_score_boundaries() {
        let t = HealthScoringConfig::default();
        assert_eq!(WorkerStatus::from_score(100.0, &t), WorkerStatus::Healthy);
        assert_eq!(WorkerStatus::from_score(70.0, &t), WorkerStatus::Healthy);
        assert_eq!(WorkerStatus::from_score(69.0, &t), WorkerStatus::Degraded);
        assert_eq!(WorkerStatus::from_score(40.0, &t), WorkerStatus::Degraded);
        assert_eq!(WorkerStatus::from_score(39.0, &t), WorkerStatus::Unhealthy);
        assert_eq!(WorkerStatus::from_score(10.0, &t), WorkerStatus::Unhealthy);
        assert_eq!(WorkerStatus::from_score(9.0, &t), WorkerStatus::Dead);
        assert_eq!(WorkerStatus::from_score(0.0, &t), WorkerStatus::Dead);
    }

    #[test]
    fn test_custom_thresholds() {
        let t = HealthScoringConfig {
            degraded_threshold: 90.0,
            unhealthy_threshold: 60.0,
            dead_threshold: 30.0,
        };
        assert_eq!(WorkerStatus::from_score(85.0, &t), WorkerStatus::Degraded);
        assert_eq!(WorkerStatus::from_score(29.0, &t), WorkerStatus::Dead);
    }

    #[test]
    fn test_needs_attention() {
        assert!(!WorkerStatus::Healthy.needs_attention());
        assert!(WorkerStatus::Degraded.needs_attention());
        assert!(WorkerStatus::Unhealthy.needs_attention());
        assert!(WorkerStatus::Dead.needs_attention());
        assert!(!WorkerStatus::Recovering.needs_attention());
    }

    #[test]
    fn test_circuit_state_serialization() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap_or_default();
        assert_eq!(json, "\"half_open\"");
        assert_eq!(CircuitState::Open.to_string(), "open");
    }
}
