use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A convenience `Result` alias using [`SwitchyardError`].
pub type SwitchyardResult<T> = Result<T, SwitchyardError>;

/// Top-level error type for the Switchyard orchestrator.
///
/// Variants are grouped by the component that raises them. Every variant maps
/// onto a serialisable [`ErrorKind`] so failures can cross component
/// boundaries by value inside result structs.
#[derive(Error, Debug)]
pub enum SwitchyardError {
    // --- Coordinator ---
    /// The payload is missing a required field or a field has the wrong type.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The task type does not name any known handler.
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// The worker could not be reached (connection refused, DNS, open circuit).
    #[error("Worker unavailable: {worker_id}: {reason}")]
    WorkerUnavailable {
        /// Worker that was called.
        worker_id: String,
        /// Transport error text.
        reason: String,
    },

    /// The worker did not answer within its call timeout.
    #[error("Worker timeout: {worker_id} after {timeout:?}")]
    WorkerTimeout {
        /// Worker that was called.
        worker_id: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The worker answered with a non-2xx status or a malformed body.
    #[error("Worker failure: {worker_id}: {reason}")]
    WorkerFailure {
        /// Worker that answered.
        worker_id: String,
        /// Status or body problem.
        reason: String,
    },

    /// Every fanned-out worker call failed.
    #[error("All {attempted} worker calls failed: {summary}")]
    AggregateFailure {
        /// Number of calls made.
        attempted: usize,
        /// Per-worker errors joined into one line.
        summary: String,
    },

    /// The external API budget for this key is exhausted.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    // --- Workflow engine ---
    /// Pending steps can never become ready.
    #[error("Circular dependency among steps: {}", .0.join(", "))]
    CircularDependency(Vec<String>),

    /// A step used its whole retry budget without succeeding.
    #[error("Step '{step_id}' failed after {attempts} attempt(s): {last_error}")]
    StepRetriesExhausted {
        /// Step that failed.
        step_id: String,
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: String,
    },

    /// The workflow stopped before all steps reached a terminal state.
    #[error("Workflow aborted: {0}")]
    WorkflowAborted(String),

    /// The workflow definition is structurally invalid.
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    // --- Auto recovery ---
    /// The worker already used all of its recovery attempts.
    #[error("Max recovery attempts ({max}) exceeded for {worker_id}")]
    MaxRecoveryAttemptsExceeded {
        /// Worker given up on.
        worker_id: String,
        /// Configured attempt limit.
        max: u32,
    },

    /// The chosen remediation needs an operator.
    #[error("Manual intervention required for {0}")]
    ManualInterventionRequired(String),

    // --- Ambient ---
    /// Configuration parsing or validation failed.
    #[error("Config error: {0}")]
    Config(String),

    /// Outbound HTTP plumbing failed outside a worker call.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A defect inside the orchestrator itself (caught panic, poisoned state).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwitchyardError {
    /// The serialisable code for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::UnknownTaskType(_) => ErrorKind::UnknownTaskType,
            Self::WorkerUnavailable { .. } => ErrorKind::WorkerUnavailable,
            Self::WorkerTimeout { .. } => ErrorKind::WorkerTimeout,
            Self::WorkerFailure { .. } => ErrorKind::WorkerFailure,
            Self::AggregateFailure { .. } => ErrorKind::AggregateFailure,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::CircularDependency(_) => ErrorKind::CircularDependency,
            Self::StepRetriesExhausted { .. } => ErrorKind::StepRetriesExhausted,
            Self::WorkflowAborted(_) => ErrorKind::WorkflowAborted,
            Self::InvalidWorkflow(_) => ErrorKind::InvalidWorkflow,
            Self::MaxRecoveryAttemptsExceeded { .. } => ErrorKind::MaxRecoveryAttemptsExceeded,
            Self::ManualInterventionRequired(_) => ErrorKind::ManualInterventionRequired,
            Self::Config(_) => ErrorKind::Config,
            Self::Http(_) => ErrorKind::Http,
            Self::Json(_) => ErrorKind::Json,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Serialisable error code attached to results that cross component boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed task payload.
    InvalidPayload,
    /// No handler for the requested task type.
    UnknownTaskType,
    /// Worker could not be reached.
    WorkerUnavailable,
    /// Worker did not answer in time.
    WorkerTimeout,
    /// Worker answered with an error or a bad body.
    WorkerFailure,
    /// Every fanned-out call failed.
    AggregateFailure,
    /// Utility API budget exhausted.
    RateLimited,
    /// No workflow step can become ready.
    CircularDependency,
    /// A step failed on every attempt.
    StepRetriesExhausted,
    /// Run cancelled or abandoned.
    WorkflowAborted,
    /// Workflow definition rejected.
    InvalidWorkflow,
    /// Recovery gave up on a worker.
    MaxRecoveryAttemptsExceeded,
    /// Remediation needs an operator.
    ManualInterventionRequired,
    /// Bad configuration.
    Config,
    /// HTTP client failure.
    Http,
    /// JSON (de)serialisation failure.
    Json,
    /// I/O failure.
    Io,
    /// Unexpected internal fault, including caught panics.
    Internal,
}

impl ErrorKind {
    /// Transient failures are worth another attempt; malformed input never is.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::WorkerUnavailable
                | ErrorKind::WorkerTimeout
                | ErrorKind::WorkerFailure
                | ErrorKind::AggregateFailure
                | ErrorKind::RateLimited
                | ErrorKind::Http
                | ErrorKind::Internal
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // serde names are the canonical wire form
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{self:?}"));
        f.write_str(&name)
    }
}
