use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_core::{CoordinationStatus, ErrorKind, SwitchyardError};
use tracing::info;

/// JSON error body with an HTTP status.
pub struct ApiError {
    status: StatusCode,
    message: String,
    kind: Option<ErrorKind>,
}

impl ApiError {
    fn not_found(what: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{what} not found"),
            kind: None,
        }
    }
}

impl From<SwitchyardError> for ApiError {
    fn from(err: SwitchyardError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            message: err.to_string(),
            kind: Some(kind),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"error": self.message, "errorKind": self.kind});
        (self.status, Json(body)).into_response()
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidPayload | ErrorKind::InvalidWorkflow | ErrorKind::Json => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::UnknownTaskType => StatusCode::NOT_FOUND,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::WorkerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::WorkerTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::WorkerFailure | ErrorKind::AggregateFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::CircularDependency
        | ErrorKind::StepRetriesExhausted
        | ErrorKind::WorkflowAborted
        | ErrorKind::MaxRecoveryAttemptsExceeded
        | ErrorKind::ManualInterventionRequired => StatusCode::CONFLICT,
        ErrorKind::Config | ErrorKind::Http | ErrorKind::Io | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

type ApiResult = Result<Response, ApiError>;

/// `GET /health`: liveness plus a worker health summary.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let summary = state.monitor.health_summary().await;
    Json(json!({
        "status": "ok",
        "service": "switchyard",
        "workers": summary,
    }))
}

/// `POST /api/coordinate/{task_type}`: the body is the task payload.
pub async fn coordinate(
    State(state): State<Arc<AppState>>,
    Path(task_type): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    let result = state.coordinator.coordinate(&task_type, payload).await;
    let status = match result.status {
        CoordinationStatus::Success | CoordinationStatus::Partial => StatusCode::OK,
        CoordinationStatus::Error => result
            .error_kind
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, status_for),
    };
    (status, Json(result)).into_response()
}

/// `POST /api/workflows`: validate and run a workflow definition.
pub async fn submit_workflow(
    State(state): State<Arc<AppState>>,
    Json(definition): Json<Value>,
) -> ApiResult {
    let outcome = state.workflows.execute_json(definition).await?;
    Ok(Json(outcome).into_response())
}

/// `GET /api/workflows`: active and finished runs.
pub async fn list_workflows(State(state): State<Arc<AppState>>) -> Json<Value> {
    let active = state.workflows.list_active();
    let completed = state.workflows.list_completed();
    Json(json!({"active": active, "completed": completed}))
}

/// `GET /api/workflows/{id}`
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let run = state
        .workflows
        .get_workflow(&id)
        .ok_or_else(|| ApiError::not_found(format!("workflow '{id}'")))?;
    Ok(Json(run).into_response())
}

/// `POST /api/workflows/{id}/cancel`
pub async fn cancel_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    if state.workflows.get_workflow(&id).is_none() {
        return Err(ApiError::not_found(format!("workflow '{id}'")));
    }
    if !state.workflows.cancel_workflow(&id) {
        return Err(ApiError::from(SwitchyardError::InvalidWorkflow(format!(
            "workflow '{id}' already finished"
        ))));
    }
    let body = json!({"workflowId": id, "cancelRequested": true});
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// `POST /api/workflows/{id}/rollback`
pub async fn rollback_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    if state.workflows.get_workflow(&id).is_none() {
        return Err(ApiError::not_found(format!("workflow '{id}'")));
    }
    let outcome = state.workflows.rollback_workflow(&id).await.map_err(|e| ApiError {
        status: StatusCode::CONFLICT,
        message: e.to_string(),
        kind: Some(e.kind()),
    })?;
    Ok(Json(outcome).into_response())
}

/// `GET /api/workers/health`
pub async fn all_health(State(state): State<Arc<AppState>>) -> Response {
    Json(state.monitor.get_all_health().await).into_response()
}

/// `GET /api/workers/unhealthy`
pub async fn unhealthy(State(state): State<Arc<AppState>>) -> Response {
    Json(state.monitor.list_unhealthy().await).into_response()
}

/// `GET /api/workers/{id}/health`
pub async fn worker_health(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let health = state
        .monitor
        .get_health(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("worker '{id}'")))?;
    Ok(Json(health).into_response())
}

/// `GET /api/workers/{id}/recovery`: attempt history.
pub async fn worker_recovery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    if state.monitor.get_health(&id).await.is_none() {
        return Err(ApiError::not_found(format!("worker '{id}'")));
    }
    Ok(Json(json!({
        "workerId": id,
        "attemptsUsed": state.recovery.attempts_used(&id),
        "maxAttempts": state.recovery.config().max_recovery_attempts,
        "gaveUp": state.recovery.has_given_up(&id),
        "history": state.recovery.history(&id),
    }))
    .into_response())
}

/// One immediate recovery attempt, still bounded by the attempt budget.
pub async fn recover_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let attempt = state.recovery.recover_now(&id).await?;
    Ok(Json(attempt).into_response())
}

/// `POST /api/workers/{id}/recovery/reset`: restore the attempt budget.
pub async fn reset_recovery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    if state.monitor.get_health(&id).await.is_none() {
        return Err(ApiError::not_found(format!("worker '{id}'")));
    }
    state.recovery.reset_attempts(&id).await;
    info!(worker_id = %id, "Recovery attempts reset over HTTP");
    Ok(Json(json!({"workerId": id, "attemptsUsed": 0})).into_response())
}

/// `GET /api/stats`
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "coordinator": state.coordinator.stats(),
        "health": state.monitor.health_summary().await,
        "workflows": {
            "active": state.workflows.list_active().len(),
            "completed": state.workflows.list_completed().len(),
        },
    }))
}
