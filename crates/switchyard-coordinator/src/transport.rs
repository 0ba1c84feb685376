use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use switchyard_core::{SwitchyardError, SwitchyardResult, WorkerDescriptor};
use tracing::debug;

/// How the coordinator reaches a worker.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Invoke `verb` on the worker with a JSON body and return its response data.
    async fn call(
        &self,
        worker: &WorkerDescriptor,
        verb: &str,
        body: &Value,
        timeout: Duration,
    ) -> SwitchyardResult<Value>;
}

/// `POST <endpoint>/api/<verb>` with a JSON body.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Transport with a default reqwest client.
    pub fn new() -> SwitchyardResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SwitchyardError::Http(format!("failed to build worker client: {e}")))?;
        Ok(Self { client })
    }

    /// Transport over a caller-configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkerTransport for HttpTransport {
    async fn call(
        &self,
        worker: &WorkerDescriptor,
        verb: &str,
        body: &Value,
        timeout: Duration,
    ) -> SwitchyardResult<Value> {
        let url = worker.url(&format!("/api/{verb}"));
        debug!(worker_id = %worker.worker_id, url = %url, "Calling worker");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(&worker.worker_id, &e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SwitchyardError::WorkerFailure {
                worker_id: worker.worker_id.clone(),
                reason: format!("HTTP {status}: {}", truncate(&text, 200)),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_send_error(&worker.worker_id, &e, timeout))?;
        let data: Value =
            serde_json::from_slice(&bytes).map_err(|e| SwitchyardError::WorkerFailure {
                worker_id: worker.worker_id.clone(),
                reason: format!("malformed response body: {e}"),
            })?;
        check_reported_status(&worker.worker_id, data)
    }
}

/// Map a reqwest transport error onto the worker error taxonomy.
pub(crate) fn map_send_error(
    worker_id: &str,
    err: &reqwest::Error,
    timeout: Duration,
) -> SwitchyardError {
    if err.is_timeout() {
        SwitchyardError::WorkerTimeout {
            worker_id: worker_id.to_string(),
            timeout,
        }
    } else if err.is_connect() || err.is_request() {
        SwitchyardError::WorkerUnavailable {
            worker_id: worker_id.to_string(),
            reason: err.to_string(),
        }
    } else {
        SwitchyardError::WorkerFailure {
            worker_id: worker_id.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Workers answer `{status, ...data}`; an object reporting `status: "error"` is a failure.
fn check_reported_status(worker_id: &str, data: Value) -> SwitchyardResult<Value> {
    let Some(obj) = data.as_object() else {
        return Err(SwitchyardError::WorkerFailure {
            worker_id: worker_id.to_string(),
            reason: "response body is not a JSON object".into(),
        });
    };
    if obj.get("status").and_then(Value::as_str) == Some("error") {
        let reason = obj
            .get("error")
            .or_else(|| obj.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("worker reported an error")
            .to_string();
        return Err(SwitchyardError::WorkerFailure {
            worker_id: worker_id.to_string(),
            reason,
        });
    }
    Ok(data)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
