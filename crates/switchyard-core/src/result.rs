use crate::error::{ErrorKind, SwitchyardError};
use serde::{Deserialize, Serialize};

/// Overall outcome of one `coordinate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationStatus {
    /// Every fanned-out worker call succeeded.
    Success,
    /// A strict, non-empty subset of the worker calls succeeded.
    Partial,
    /// Nothing succeeded, or the request never reached a worker.
    Error,
}

/// Outcome of a single worker call inside a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerCallStatus {
    /// The worker returned usable data.
    Success,
    /// The call failed; see `error`.
    Error,
}

/// One worker's contribution to a [`CoordinationResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCallResult {
    /// Worker that handled the call.
    pub worker_id: String,
    /// Whether the call succeeded.
    pub status: WorkerCallStatus,
    /// Response body on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Wall-clock time of the call.
    pub latency_ms: u64,
}

impl WorkerCallResult {
    /// Successful call carrying `data`.
    pub fn success(worker_id: impl Into<String>, data: serde_json::Value, latency_ms: u64) -> Self {
        Self {
            worker_id: worker_id.into(),
            status: WorkerCallStatus::Success,
            data: Some(data),
            error: None,
            error_kind: None,
            latency_ms,
        }
    }

    /// Failed call, recording the error's message and kind.
    pub fn failure(worker_id: impl Into<String>, err: &SwitchyardError, latency_ms: u64) -> Self {
        Self {
            worker_id: worker_id.into(),
            status: WorkerCallStatus::Error,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            latency_ms,
        }
    }

    /// True for [`WorkerCallStatus::Success`].
    pub fn is_success(&self) -> bool {
        self.status == WorkerCallStatus::Success
    }
}

/// The structured result every `coordinate` call returns.
///
/// Failures are values here, never panics or bubbled errors: callers always get
/// a status plus whatever per-worker detail was collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationResult {
    /// Aggregate status over all worker calls.
    pub status: CoordinationStatus,
    /// Task type that was routed.
    pub task_type: String,
    /// Merged payload; absent on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Human-readable error for `error` and `partial` results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Every worker call made, successful or not.
    #[serde(default)]
    pub per_worker_results: Vec<WorkerCallResult>,
}

impl CoordinationResult {
    /// A successful result that did not involve a worker fan-out.
    pub fn success(task_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status: CoordinationStatus::Success,
            task_type: task_type.into(),
            data: Some(data),
            error: None,
            error_kind: None,
            per_worker_results: Vec::new(),
        }
    }

    /// An error result carrying the error's message and kind.
    pub fn from_error(task_type: impl Into<String>, err: &SwitchyardError) -> Self {
        Self {
            status: CoordinationStatus::Error,
            task_type: task_type.into(),
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            per_worker_results: Vec::new(),
        }
    }

    /// Attach per-worker detail (kept even on error so failures stay visible).
    pub fn with_worker_results(mut self, results: Vec<WorkerCallResult>) -> Self {
        self.per_worker_results = results;
        self
    }

    /// True only for a full success.
    pub fn is_success(&self) -> bool {
        self.status == CoordinationStatus::Success
    }

    /// Error message, falling back to the status when none was recorded.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("coordination finished with status {:?}", self.status))
    }
}
