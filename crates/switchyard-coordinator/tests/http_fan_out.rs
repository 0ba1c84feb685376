//! Coordinator over real HTTP workers (wiremock), including health reporting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchyard_coordinator::*;
use switchyard_core::{
    CoordinationStatus, CoordinatorConfig, ErrorKind, HealthConfig, WorkerDescriptor,
};
use switchyard_health::{HealthMonitor, HttpLivenessProbe};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn review_worker(score: f64, approved: bool) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/review"))
        .and(body_partial_json(json!({"content": "draft v2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "score": score,
            "approved": approved,
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_reviewer_fan_out_over_http() {
    let a = review_worker(9.0, true).await;
    let b = review_worker(7.0, true).await;
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;

    let coordinator = Coordinator::with_http(CoordinatorConfig::default()).unwrap();
    coordinator
        .register_worker(WorkerDescriptor::new("rev-a", "reviewer", a.uri()))
        .await;
    coordinator
        .register_worker(WorkerDescriptor::new("rev-b", "reviewer", b.uri()))
        .await;
    coordinator
        .register_worker(WorkerDescriptor::new("rev-c", "reviewer", broken.uri()))
        .await;

    let result = coordinator
        .coordinate("reviewer", json!({"content": "draft v2"}))
        .await;
    assert_eq!(result.status, CoordinationStatus::Partial);
    assert_eq!(result.per_worker_results.len(), 3);

    let data = result.data.unwrap();
    assert_eq!(data["consensus"]["score"], 8.0);
    assert_eq!(data["consensus"]["approved"], true);
    assert_eq!(data["consensus"]["reviewers"], 2);

    let failed = result
        .per_worker_results
        .iter()
        .find(|r| r.worker_id == "rev-c")
        .unwrap();
    assert_eq!(failed.error_kind, Some(ErrorKind::WorkerFailure));

    let stats = coordinator.stats();
    assert_eq!(stats.kinds["reviewer"].requests, 1);
    assert_eq!(stats.kinds["reviewer"].partials, 1);
    assert_eq!(stats.registered_workers, 3);
}

#[tokio::test]
async fn test_worker_outcomes_reach_health_monitor() {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/analyze"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "success", "pick": "home"})),
        )
        .mount(&worker)
        .await;

    let monitor = Arc::new(HealthMonitor::new(
        HealthConfig::default(),
        Arc::new(HttpLivenessProbe::new(Duration::from_secs(2)).unwrap()),
    ));
    let coordinator = Coordinator::with_http(CoordinatorConfig::default())
        .unwrap()
        .with_monitor(monitor.clone());
    coordinator
        .register_worker(WorkerDescriptor::new("sports-1", "sports", worker.uri()))
        .await;

    let result = coordinator
        .coordinate("sports", json!({"query": "derby odds"}))
        .await;
    assert!(result.is_success());
    assert_eq!(result.data.unwrap()["pick"], "home");

    // reporting is fire-and-forget; poll briefly
    let mut recorded = false;
    for _ in 0..50 {
        if monitor
            .get_health("sports-1")
            .await
            .is_some_and(|h| h.success_count == 1)
        {
            recorded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(recorded, "monitor never saw the interaction");
}

#[tokio::test]
async fn test_utility_through_coordinate() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"usd": 1.0})))
        .expect(1)
        .mount(&api)
        .await;

    let coordinator = Coordinator::with_http(CoordinatorConfig::default()).unwrap();
    let payload = json!({"apiId": "fx", "url": format!("{}/rates", api.uri())});

    let first = coordinator.coordinate("utility", payload.clone()).await;
    assert!(first.is_success());
    assert_eq!(first.data.unwrap()["cached"], false);

    let second = coordinator.coordinate("utility", payload).await;
    assert_eq!(second.data.unwrap()["cached"], true);
}
