use async_trait::async_trait;
use std::time::{Duration, Instant};
use switchyard_core::{SwitchyardError, SwitchyardResult, WorkerDescriptor};

/// Liveness check used by the health monitor's periodic loop.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Check the worker once, returning the observed round-trip latency.
    async fn check(&self, worker: &WorkerDescriptor) -> SwitchyardResult<Duration>;
}

/// Probes `GET <endpoint>/health` and treats any 2xx answer as alive.
pub struct HttpLivenessProbe {
    client: reqwest::Client,
}

impl HttpLivenessProbe {
    /// Probe with its own client and per-request timeout.
    pub fn new(timeout: Duration) -> SwitchyardResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SwitchyardError::Http(format!("failed to build probe client: {e}")))?;
        Ok(Self { client })
    }

    /// Probe over a caller-configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LivenessProbe for HttpLivenessProbe {
    async fn check(&self, worker: &WorkerDescriptor) -> SwitchyardResult<Duration> {
        let start = Instant::now();
        let response = self
            .client
            .get(worker.url("/health"))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SwitchyardError::WorkerTimeout {
                        worker_id: worker.worker_id.clone(),
                        timeout: start.elapsed(),
                    }
                } else {
                    SwitchyardError::WorkerUnavailable {
                        worker_id: worker.worker_id.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(start.elapsed())
        } else {
            Err(SwitchyardError::WorkerFailure {
                worker_id: worker.worker_id.clone(),
                reason: format!("health endpoint returned {status}"),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use switchyard_core::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_probe_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .mount(&server)
            .await;

        let probe = HttpLivenessProbe::new(Duration::from_secs(2)).unwrap();
        let worker = WorkerDescriptor::new("w1", "sports", server.uri());
        assert!(probe.check(&worker).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_probe_non_2xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = HttpLivenessProbe::new(Duration::from_secs(2)).unwrap();
        let worker = WorkerDescriptor::new("w1", "sports", server.uri());
        let err = probe.check(&worker).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorkerFailure);
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused() {
        let probe = HttpLivenessProbe::new(Duration::from_secs(2)).unwrap();
        let worker = WorkerDescriptor::new("w1", "sports", "http://127.0.0.1:1");
        let err = probe.check(&worker).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorkerUnavailable);
    }
}
