use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use switchyard_coordinator::Coordinator;
use switchyard_core::{CoordinationResult, CoordinationStatus, ErrorKind, SwitchyardError};

/// Runs one workflow step (or compensation) against a worker category.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Send `payload` to a worker of kind `agent_type`.
    async fn execute(&self, agent_type: &str, payload: Value) -> CoordinationResult;
}

#[async_trait]
impl StepExecutor for Coordinator {
    async fn execute(&self, agent_type: &str, payload: Value) -> CoordinationResult {
        self.coordinate(agent_type, payload).await
    }
}

/// Why a single executor call did not produce a usable result.
#[derive(Debug, Clone)]
pub(crate) struct CallFailure {
    /// Error message.
    pub message: String,
    /// Error code.
    pub kind: ErrorKind,
}

impl CallFailure {
    fn from_error(err: &SwitchyardError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

/// Call the executor under `timeout`, folding timeouts, panics and
/// non-success statuses into a [`CallFailure`].
pub(crate) async fn call_step(
    executor: &dyn StepExecutor,
    agent_type: &str,
    payload: Value,
    timeout: Duration,
) -> Result<Value, CallFailure> {
    let call = AssertUnwindSafe(executor.execute(agent_type, payload)).catch_unwind();
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => {
            return Err(CallFailure::from_error(&SwitchyardError::Internal(format!(
                "executor panicked while running '{agent_type}'"
            ))))
        }
        Err(_) => {
            return Err(CallFailure::from_error(&SwitchyardError::WorkerTimeout {
                worker_id: agent_type.to_string(),
                timeout,
            }))
        }
    };

    match result.status {
        CoordinationStatus::Success => Ok(result.data.unwrap_or(Value::Null)),
        // a partial answer is not a successful step
        CoordinationStatus::Partial => {
            let failed = result
                .per_worker_results
                .iter()
                .filter(|r| !r.is_success())
                .count();
            Err(CallFailure::from_error(&SwitchyardError::WorkerFailure {
                worker_id: agent_type.to_string(),
                reason: format!(
                    "partial result: {failed} of {} worker calls failed",
                    result.per_worker_results.len()
                ),
            }))
        }
        CoordinationStatus::Error => Err(CallFailure {
            message: result.error_message(),
            kind: result.error_kind.unwrap_or(ErrorKind::Internal),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_core::WorkerCallResult;

    struct Fixed(CoordinationResult);

    #[async_trait]
    impl StepExecutor for Fixed {
        async fn execute(&self, _agent_type: &str, _payload: Value) -> CoordinationResult {
            self.0.clone()
        }
    }

    struct Panics;

    #[async_trait]
    impl StepExecutor for Panics {
        async fn execute(&self, _agent_type: &str, _payload: Value) -> CoordinationResult {
            panic!("boom")
        }
    }

    struct Slow;

    #[async_trait]
    impl StepExecutor for Slow {
        async fn execute(&self, agent_type: &str, _payload: Value) -> CoordinationResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            CoordinationResult::success(agent_type, json!({}))
        }
    }

    const T: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_success_yields_data() {
        let exec = Fixed(CoordinationResult::success("sports", json!({"pick": "home"})));
        let data = call_step(&exec, "sports", json!({}), T).await.unwrap();
        assert_eq!(data["pick"], "home");
    }

    #[tokio::test]
    async fn test_error_keeps_kind() {
        let exec = Fixed(CoordinationResult::from_error(
            "sports",
            &SwitchyardError::InvalidPayload("query missing".into()),
        ));
        let failure = call_step(&exec, "sports", json!({}), T).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InvalidPayload);
        assert!(failure.message.contains("query missing"));
    }

    #[tokio::test]
    async fn test_partial_is_a_retryable_failure() {
        let err = SwitchyardError::WorkerFailure {
            worker_id: "r2".into(),
            reason: "HTTP 500".into(),
        };
        let mut partial =
            CoordinationResult::success("reviewer", json!({})).with_worker_results(vec![
                WorkerCallResult::success("r1", json!({}), 3),
                WorkerCallResult::failure("r2", &err, 3),
            ]);
        partial.status = CoordinationStatus::Partial;
        let failure = call_step(&Fixed(partial), "reviewer", json!({}), T)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::WorkerFailure);
        assert!(failure.message.contains("1 of 2"));
    }

    #[tokio::test]
    async fn test_panic_becomes_internal() {
        let failure = call_step(&Panics, "writer", json!({}), T).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Internal);
        assert!(failure.message.contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let failure = call_step(&Slow, "crypto", json!({}), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::WorkerTimeout);
    }
}
