//! Worker health tracking and automatic recovery for the Switchyard orchestrator.
//!
//! The [`HealthMonitor`] owns one health record per worker: a bounded score,
//! counters, a latency window and a circuit breaker. [`AutoRecovery`] reads the
//! monitor's snapshots on its own interval and drives remediation through an
//! injected [`Remediator`].
//!
//! # Main types
//!
//! - [`HealthMonitor`]: Scores workers, runs the circuit breakers and the periodic liveness loop.
//! - [`AutoRecovery`]: Picks a strategy per unhealthy worker, backs off, records history.
//! - [`CircuitBreaker`]: Closed/Open/HalfOpen state machine.
//! - [`LivenessProbe`]: Pluggable liveness check; [`HttpLivenessProbe`] calls `GET /health`.
//! - [`Supervised`]: Background loop with a shutdown channel, joined on stop.

/// Per-worker circuit breaker.
pub mod circuit;
/// Health monitor and periodic check loop.
pub mod monitor;
/// Liveness probes.
pub mod probe;
/// Auto recovery control loop and remediation hooks.
pub mod recovery;
/// Supervised background tasks.
pub mod supervisor;
/// Health snapshots and status types.
pub mod types;

pub use circuit::{CircuitBreaker, Transition};
pub use monitor::{CheckCycleReport, HealthMonitor};
pub use probe::{HttpLivenessProbe, LivenessProbe};
pub use recovery::{
    AutoRecovery, NoopRemediator, RecoveryAttempt, RecoveryCallback, RecoveryOutcome,
    RecoveryStrategy, Remediator,
};
pub use supervisor::Supervised;
pub use types::{CircuitState, HealthSummary, Interaction, WorkerHealth, WorkerStatus};
