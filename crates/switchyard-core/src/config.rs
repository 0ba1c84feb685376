use crate::error::{SwitchyardError, SwitchyardResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the health monitor's periodic loop, scoring and circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between periodic check cycles.
    #[serde(default = "default_heartbeat_interval", alias = "heartbeatIntervalSeconds")]
    pub heartbeat_interval_seconds: u64,
    /// Grace period after the last interaction before a heartbeat counts as missed.
    #[serde(default = "default_heartbeat_timeout", alias = "heartbeatTimeoutSeconds")]
    pub heartbeat_timeout_seconds: u64,
    /// Timeout for a single liveness probe.
    #[serde(default = "default_check_timeout", alias = "checkTimeoutSeconds")]
    pub check_timeout_seconds: u64,
    /// Number of recent latencies kept per worker.
    #[serde(default = "default_latency_window", alias = "latencyWindow")]
    pub latency_window: usize,
    /// Circuit breaker thresholds.
    #[serde(default, alias = "circuitBreaker")]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Score thresholds used to derive worker status.
    #[serde(default, alias = "healthScoring")]
    pub health_scoring: HealthScoringConfig,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            heartbeat_timeout_seconds: default_heartbeat_timeout(),
            check_timeout_seconds: default_check_timeout(),
            latency_window: default_latency_window(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health_scoring: HealthScoringConfig::default(),
        }
    }
}

impl HealthConfig {
    /// Interval of the periodic check loop.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Grace period after which a silent worker counts as a missed heartbeat.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    /// Timeout for a single liveness probe.
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_seconds)
    }

    /// Reject settings the state machines cannot work with.
    pub fn validate(&self) -> SwitchyardResult<()> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(SwitchyardError::Config(
                "heartbeat_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.latency_window == 0 {
            return Err(SwitchyardError::Config(
                "latency_window must be greater than zero".into(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(SwitchyardError::Config(
                "circuit_breaker.failure_threshold must be greater than zero".into(),
            ));
        }
        self.health_scoring.validate()
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold", alias = "failureThreshold")]
    pub failure_threshold: u32,
    /// Time an open circuit waits before letting a probe through.
    #[serde(default = "default_test_interval", alias = "testIntervalSeconds")]
    pub test_interval_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            test_interval_seconds: default_test_interval(),
        }
    }
}

impl CircuitBreakerConfig {
    /// How long a circuit stays open before it may go half-open.
    pub fn test_interval(&self) -> Duration {
        Duration::from_secs(self.test_interval_seconds)
    }
}

/// Score thresholds used to derive a worker's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScoringConfig {
    /// Scores at or above this are `healthy`.
    #[serde(default = "default_degraded", alias = "degradedThreshold")]
    pub degraded_threshold: f64,
    /// Scores at or above this (and below degraded) are `degraded`.
    #[serde(default = "default_unhealthy", alias = "unhealthyThreshold")]
    pub unhealthy_threshold: f64,
    /// Scores below this are `dead`.
    #[serde(default = "default_dead", alias = "deadThreshold")]
    pub dead_threshold: f64,
}

impl Default for HealthScoringConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: default_degraded(),
            unhealthy_threshold: default_unhealthy(),
            dead_threshold: default_dead(),
        }
    }
}

impl HealthScoringConfig {
    /// Thresholds must be strictly descending and within `0..=100`.
    pub fn validate(&self) -> SwitchyardResult<()> {
        let ordered = self.degraded_threshold <= 100.0
            && self.degraded_threshold > self.unhealthy_threshold
            && self.unhealthy_threshold > self.dead_threshold
            && self.dead_threshold >= 0.0;
        if ordered {
            Ok(())
        } else {
            Err(SwitchyardError::Config(format!(
                "health thresholds must satisfy 100 >= degraded > unhealthy > dead >= 0, \
                 got {}/{}/{}",
                self.degraded_threshold, self.unhealthy_threshold, self.dead_threshold
            )))
        }
    }
}

/// Settings for the auto-recovery control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Whether the control loop runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between recovery scans.
    #[serde(default = "default_recovery_interval", alias = "checkIntervalSeconds")]
    pub check_interval_seconds: u64,
    /// Remediation attempts per worker before giving up.
    #[serde(default = "default_max_attempts", alias = "maxRecoveryAttempts")]
    pub max_recovery_attempts: u32,
    /// Backoff before each attempt, indexed by attempt number.
    #[serde(default = "default_backoff", alias = "recoveryBackoffSeconds")]
    pub recovery_backoff_seconds: Vec<u64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: default_recovery_interval(),
            max_recovery_attempts: default_max_attempts(),
            recovery_backoff_seconds: default_backoff(),
        }
    }
}

impl RecoveryConfig {
    /// Interval of the recovery control loop.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// Backoff before the given 1-based attempt, clamped to the last entry.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) - 1) as usize;
        self.recovery_backoff_seconds
            .get(idx)
            .or_else(|| self.recovery_backoff_seconds.last())
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or_default()
    }

    /// Reject a zero scan interval and an empty backoff list.
    pub fn validate(&self) -> SwitchyardResult<()> {
        if self.check_interval_seconds == 0 {
            return Err(SwitchyardError::Config(
                "recovery.check_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.recovery_backoff_seconds.is_empty() {
            return Err(SwitchyardError::Config(
                "recovery.recovery_backoff_seconds must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for worker calls and the utility task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Per-call timeout for worker requests.
    #[serde(default = "default_worker_timeout", alias = "workerTimeoutSeconds")]
    pub worker_timeout_seconds: u64,
    /// Settings for the `utility` task kind.
    #[serde(default)]
    pub utility: UtilityConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_timeout_seconds: default_worker_timeout(),
            utility: UtilityConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Per-call timeout for worker requests.
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_seconds)
    }

    /// Reject a zero worker timeout and unusable utility limits.
    pub fn validate(&self) -> SwitchyardResult<()> {
        if self.worker_timeout_seconds == 0 {
            return Err(SwitchyardError::Config(
                "coordinator.worker_timeout_seconds must be greater than zero".into(),
            ));
        }
        self.utility.validate()
    }
}

/// Cache and rate limit settings for external API calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityConfig {
    /// How long cached GET responses stay fresh.
    #[serde(default = "default_cache_ttl", alias = "cacheTtlSeconds")]
    pub cache_ttl_seconds: u64,
    /// Calls an API may make back to back.
    #[serde(default = "default_rate_burst", alias = "rateLimitBurst")]
    pub rate_limit_burst: f64,
    /// Tokens regained per second, per API.
    #[serde(default = "default_rate_per_second", alias = "rateLimitPerSecond")]
    pub rate_limit_per_second: f64,
    /// Timeout for outbound utility requests.
    #[serde(default = "default_request_timeout", alias = "requestTimeoutSeconds")]
    pub request_timeout_seconds: u64,
}

/// Slowest non-zero refill rate accepted for the utility rate limiter.
pub const MIN_RATE_PER_SECOND: f64 = 0.001;

impl UtilityConfig {
    /// The burst must allow at least one call; the refill rate is either zero
    /// (never refills) or at least [`MIN_RATE_PER_SECOND`].
    pub fn validate(&self) -> SwitchyardResult<()> {
        if !self.rate_limit_burst.is_finite() || self.rate_limit_burst < 1.0 {
            return Err(SwitchyardError::Config(
                "coordinator.utility.rate_limit_burst must be at least 1".into(),
            ));
        }
        let rate = self.rate_limit_per_second;
        if !rate.is_finite() || rate < 0.0 || (rate > 0.0 && rate < MIN_RATE_PER_SECOND) {
            return Err(SwitchyardError::Config(format!(
                "coordinator.utility.rate_limit_per_second must be 0 \
                 or at least {MIN_RATE_PER_SECOND}"
            )));
        }
        Ok(())
    }
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl(),
            rate_limit_burst: default_rate_burst(),
            rate_limit_per_second: default_rate_per_second(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Settings for the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Length of one backoff unit; the n-th retry (from zero) waits `2^n` units.
    #[serde(default = "default_backoff_unit_ms", alias = "backoffUnitMs")]
    pub backoff_unit_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

impl WorkflowConfig {
    /// One backoff unit as a `Duration`.
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}
fn default_heartbeat_timeout() -> u64 {
    120
}
fn default_check_timeout() -> u64 {
    5
}
fn default_latency_window() -> usize {
    100
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_test_interval() -> u64 {
    60
}
fn default_degraded() -> f64 {
    70.0
}
fn default_unhealthy() -> f64 {
    40.0
}
fn default_dead() -> f64 {
    10.0
}
fn default_true() -> bool {
    true
}
fn default_recovery_interval() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff() -> Vec<u64> {
    vec![5, 15, 30]
}
fn default_worker_timeout() -> u64 {
    30
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_rate_burst() -> f64 {
    10.0
}
fn default_rate_per_second() -> f64 {
    1.0
}
fn default_request_timeout() -> u64 {
    15
}
fn default_backoff_unit_ms() -> u64 {
    1000
}
