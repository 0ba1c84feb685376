#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use switchyard_coordinator::Coordinator;
use switchyard_core::{
    CoordinatorConfig, ErrorKind, HealthConfig, RecoveryConfig, WorkerDescriptor, WorkflowConfig,
};
use switchyard_gateway::{AppState, AuthConfig, GatewayServer};
use switchyard_health::{AutoRecovery, HealthMonitor, Interaction, NoopRemediator};
use switchyard_workflow::WorkflowEngine;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestServer {
    base: String,
    state: Arc<AppState>,
    _worker: MockServer,
}

/// Helper: a gateway on a random port with one sports worker behind it.
async fn start_test_server(auth: AuthConfig) -> TestServer {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "pick": "home",
        })))
        .mount(&worker)
        .await;

    let monitor = Arc::new(HealthMonitor::with_http_probe(HealthConfig::default()).unwrap());
    let coordinator = Arc::new(
        Coordinator::with_http(CoordinatorConfig::default())
            .unwrap()
            .with_monitor(monitor.clone()),
    );
    coordinator
        .register_worker(WorkerDescriptor::new("sports-1", "sports", worker.uri()))
        .await;
    let workflows =
        WorkflowEngine::attach(coordinator.clone(), WorkflowConfig { backoff_unit_ms: 10 });
    let recovery = Arc::new(AutoRecovery::new(
        RecoveryConfig::default(),
        monitor.clone(),
        Arc::new(NoopRemediator),
    ));
    let state = Arc::new(AppState {
        coordinator,
        workflows,
        monitor,
        recovery,
    });

    let app = GatewayServer::build(state.clone(), auth);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{}", addr.port()),
        state,
        _worker: worker,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = start_test_server(AuthConfig::default()).await;
    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "switchyard");
    assert_eq!(body["workers"]["total"], 1);
}

#[tokio::test]
async fn test_coordinate_routes_to_worker() {
    let server = start_test_server(AuthConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/coordinate/sports", server.base))
        .json(&json!({"query": "derby odds"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["pick"], "home");

    let resp = client
        .post(format!("{}/api/coordinate/sports", server.base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["errorKind"], json!(ErrorKind::InvalidPayload));

    let resp = client
        .post(format!("{}/api/coordinate/astrology", server.base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let stats: Value = client
        .get(format!("{}/api/stats", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["coordinator"]["kinds"]["sports"]["requests"], 2);
    assert_eq!(stats["coordinator"]["unknown_task_types"], 1);
}

#[tokio::test]
async fn test_workflow_lifecycle() {
    let server = start_test_server(AuthConfig::default()).await;
    let client = reqwest::Client::new();

    let outcome: Value = client
        .post(format!("{}/api/workflows", server.base))
        .json(&json!({
            "workflowName": "odds-check",
            "steps": [{"stepId": "odds", "agentType": "sports", "taskData": {"query": "derby"}}]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["status"], "completed");
    let id = outcome["workflowId"].as_str().unwrap().to_string();

    let run: Value = client
        .get(format!("{}/api/workflows/{id}", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(run["name"], "odds-check");
    assert_eq!(run["steps"][0]["status"], "completed");

    let resp = client
        .post(format!("{}/api/workflows/{id}/cancel", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/workflows/{id}/rollback", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let rolled: Value = resp.json().await.unwrap();
    assert_eq!(rolled["status"], "rolled_back");

    let resp = client
        .post(format!("{}/api/workflows/{id}/rollback", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client
        .get(format!("{}/api/workflows/nope", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/api/workflows", server.base))
        .json(&json!({"steps": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_worker_health_and_recovery_endpoints() {
    let server = start_test_server(AuthConfig::default()).await;
    for _ in 0..7 {
        server
            .state
            .monitor
            .record_interaction("sports-1", Interaction::failure(ErrorKind::WorkerFailure))
            .await;
    }
    let client = reqwest::Client::new();

    let unhealthy: Vec<Value> = client
        .get(format!("{}/api/workers/unhealthy", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unhealthy.len(), 1);
    assert_eq!(unhealthy[0]["worker_id"], "sports-1");

    let health: Value = client
        .get(format!("{}/api/workers/sports-1/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["score"], 65.0);
    assert_eq!(health["status"], "degraded");

    let recovery: Value = client
        .get(format!("{}/api/workers/sports-1/recovery", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(recovery["attemptsUsed"], 0);
    assert_eq!(recovery["maxAttempts"], 3);
    assert_eq!(recovery["gaveUp"], false);

    let resp = client
        .post(format!("{}/api/workers/sports-1/recovery/reset", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/api/workers/ghost/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let all: Vec<Value> = client
        .get(format!("{}/api/workers/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_auth_required_when_keys_configured() {
    let server = start_test_server(AuthConfig::new(vec!["s3cret".to_string()])).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/stats", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{}/api/stats", server.base))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{}/api/stats", server.base))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/api/stats?api_key=s3cret", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(format!("{}/health", server.base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}
