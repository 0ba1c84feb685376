//! Health monitor and auto recovery working together.
//!
//! Uses tokio's paused clock so backoff sleeps and circuit intervals are
//! observed exactly, plus a wiremock worker for the HTTP liveness path.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{
    ErrorKind, HealthConfig, RecoveryConfig, SwitchyardResult, WorkerDescriptor,
};
use switchyard_health::*;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

struct AlwaysUp;

#[async_trait]
impl LivenessProbe for AlwaysUp {
    async fn check(&self, _worker: &WorkerDescriptor) -> SwitchyardResult<Duration> {
        Ok(Duration::from_millis(2))
    }
}

/// Records the (paused) instant of every restart and always fails.
struct RecordingRemediator {
    calls: parking_lot::Mutex<Vec<Instant>>,
}

impl RecordingRemediator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: parking_lot::Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Remediator for RecordingRemediator {
    async fn restart(&self, _worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
        self.calls.lock().push(Instant::now());
        Ok(RecoveryOutcome::Failed)
    }
}

async fn dead_worker(monitor: &HealthMonitor, worker_id: &str) {
    monitor
        .register_worker(WorkerDescriptor::new(worker_id, "crypto", "http://localhost:1"))
        .await;
    for _ in 0..20 {
        monitor
            .record_interaction(worker_id, Interaction::failure(ErrorKind::WorkerFailure))
            .await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts_with_ordered_backoff() {
    let monitor = Arc::new(HealthMonitor::new(HealthConfig::default(), Arc::new(AlwaysUp)));
    dead_worker(&monitor, "crypto-1").await;

    let remediator = RecordingRemediator::new();
    let recovery =
        AutoRecovery::new(RecoveryConfig::default(), monitor.clone(), remediator.clone());

    let start = Instant::now();
    for expected_attempt in 1..=3 {
        let attempts = recovery.run_scan().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt, expected_attempt);
        assert_eq!(attempts[0].strategy, RecoveryStrategy::Restart);
        assert_eq!(attempts[0].outcome, RecoveryOutcome::Failed);
    }

    // attempts wait 5s, 15s, 30s before calling the remediator
    let offsets: Vec<u64> = remediator
        .calls()
        .iter()
        .map(|t| t.duration_since(start).as_secs())
        .collect();
    assert_eq!(offsets, vec![5, 20, 50]);

    // fourth scan: terminal GaveUp, no remediation
    let attempts = recovery.run_scan().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, RecoveryOutcome::GaveUp);
    assert_eq!(remediator.calls().len(), 3);

    // later scans ignore the worker entirely
    assert!(recovery.run_scan().await.is_empty());
    assert_eq!(remediator.calls().len(), 3);

    let history = recovery.history("crypto-1");
    assert_eq!(history.len(), 4);
    assert!(history.len() <= RecoveryConfig::default().max_recovery_attempts as usize + 1);
    assert!(recovery.has_given_up("crypto-1"));

    let err = recovery.recover_now("crypto-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MaxRecoveryAttemptsExceeded);

    let health = monitor.get_health("crypto-1").await.unwrap();
    assert_eq!(health.recovery_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_reset_attempts_reopens_budget() {
    let monitor = Arc::new(HealthMonitor::new(HealthConfig::default(), Arc::new(AlwaysUp)));
    dead_worker(&monitor, "w").await;
    let config = RecoveryConfig {
        max_recovery_attempts: 1,
        recovery_backoff_seconds: vec![1],
        ..RecoveryConfig::default()
    };
    let remediator = RecordingRemediator::new();
    let recovery = AutoRecovery::new(config, monitor.clone(), remediator.clone());

    recovery.run_scan().await;
    assert_eq!(
        recovery.run_scan().await[0].outcome,
        RecoveryOutcome::GaveUp
    );

    recovery.reset_attempts("w").await;
    assert!(!recovery.has_given_up("w"));
    assert_eq!(recovery.attempts_used("w"), 0);

    let attempts = recovery.run_scan().await;
    assert_eq!(attempts[0].attempt, 1);
    assert_eq!(remediator.calls().len(), 2);
    // history spans both budget windows
    assert_eq!(recovery.history("w").len(), 3);
    assert_eq!(recovery.all_history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_healthy_workers_are_never_remediated() {
    let monitor = Arc::new(HealthMonitor::new(HealthConfig::default(), Arc::new(AlwaysUp)));
    monitor
        .register_worker(WorkerDescriptor::new("fine", "sports", "http://localhost:1"))
        .await;
    let remediator = RecordingRemediator::new();
    let recovery = AutoRecovery::new(RecoveryConfig::default(), monitor, remediator.clone());
    assert!(recovery.run_scan().await.is_empty());
    assert!(remediator.calls().is_empty());
}

#[tokio::test]
async fn test_http_probe_drives_scores() {
    let up = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&up)
        .await;
    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&down)
        .await;

    let monitor = HealthMonitor::with_http_probe(HealthConfig::default()).unwrap();
    monitor
        .register_worker(WorkerDescriptor::new("up", "research", up.uri()))
        .await;
    monitor
        .register_worker(WorkerDescriptor::new("down", "research", down.uri()))
        .await;

    for _ in 0..5 {
        monitor.run_check_cycle().await;
    }

    let up_health = monitor.get_health("up").await.unwrap();
    assert_eq!(up_health.score, 100.0);
    assert_eq!(up_health.heartbeat_successes, 5);
    assert!(up_health.last_heartbeat.is_some());
    assert!(up_health.avg_latency_ms.is_some());

    let down_health = monitor.get_health("down").await.unwrap();
    assert_eq!(down_health.score, 75.0);
    assert_eq!(down_health.circuit_state, CircuitState::Open);

    // the open circuit is skipped on the next cycle
    let report = monitor.run_check_cycle().await;
    assert_eq!(report.skipped_open, 1);
    assert_eq!(report.probed, 1);
}
