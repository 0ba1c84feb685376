use crate::circuit::{CircuitBreaker, Transition};
use crate::probe::{HttpLivenessProbe, LivenessProbe};
use crate::supervisor::Supervised;
use crate::types::{CircuitState, HealthSummary, Interaction, WorkerHealth, WorkerStatus};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use switchyard_core::{ErrorKind, HealthConfig, SwitchyardResult, WorkerDescriptor};
use tokio::sync::{watch, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const MAX_SCORE: f64 = 100.0;
const SUCCESS_REWARD: f64 = 1.0;
const ERROR_PENALTY: f64 = 5.0;
const HEARTBEAT_MISS_PENALTY: f64 = 10.0;

/// Mutable health record for one worker. Only the monitor touches it.
struct HealthMetrics {
    descriptor: Option<WorkerDescriptor>,
    score: f64,
    status: WorkerStatus,
    circuit: CircuitBreaker,
    heartbeat_successes: u64,
    heartbeat_failures: u64,
    success_count: u64,
    error_count: u64,
    timeout_count: u64,
    latencies_ms: VecDeque<f64>,
    recovery_attempts: u32,
    recovering: bool,
    last_contact: Instant,
    last_heartbeat: Option<DateTime<Utc>>,
}

impl HealthMetrics {
    fn new(descriptor: Option<WorkerDescriptor>, now: Instant) -> Self {
        Self {
            descriptor,
            score: MAX_SCORE,
            status: WorkerStatus::Healthy,
            circuit: CircuitBreaker::new(),
            heartbeat_successes: 0,
            heartbeat_failures: 0,
            success_count: 0,
            error_count: 0,
            timeout_count: 0,
            latencies_ms: VecDeque::new(),
            recovery_attempts: 0,
            recovering: false,
            last_contact: now,
            last_heartbeat: None,
        }
    }

    fn apply_success(&mut self, latency: Option<Duration>, window: usize, now: Instant) {
        self.score = (self.score + SUCCESS_REWARD).min(MAX_SCORE);
        self.success_count += 1;
        self.last_contact = now;
        self.last_heartbeat = Some(Utc::now());
        if let Some(latency) = latency {
            self.push_latency(latency, window);
        }
    }

    fn apply_failure(&mut self, kind: Option<ErrorKind>, now: Instant) {
        self.score = (self.score - ERROR_PENALTY).max(0.0);
        self.error_count += 1;
        self.last_contact = now;
        if kind == Some(ErrorKind::WorkerTimeout) {
            self.timeout_count += 1;
        }
    }

    fn apply_heartbeat_miss(&mut self) {
        self.score = (self.score - HEARTBEAT_MISS_PENALTY).max(0.0);
        self.heartbeat_failures += 1;
    }

    fn push_latency(&mut self, latency: Duration, window: usize) {
        self.latencies_ms.push_back(latency.as_secs_f64() * 1000.0);
        while self.latencies_ms.len() > window {
            self.latencies_ms.pop_front();
        }
    }

    fn avg_latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        Some(self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64)
    }

    fn p95_latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.latencies_ms.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
        sorted.get(rank.saturating_sub(1)).copied()
    }

    fn snapshot(&self, worker_id: &str) -> WorkerHealth {
        WorkerHealth {
            worker_id: worker_id.to_string(),
            category: self.descriptor.as_ref().map(|d| d.category.clone()),
            endpoint: self.descriptor.as_ref().map(|d| d.endpoint.clone()),
            score: self.score,
            status: if self.recovering {
                WorkerStatus::Recovering
            } else {
                self.status
            },
            circuit_state: self.circuit.state(),
            consecutive_failures: self.circuit.consecutive_failures(),
            heartbeat_successes: self.heartbeat_successes,
            heartbeat_failures: self.heartbeat_failures,
            success_count: self.success_count,
            error_count: self.error_count,
            timeout_count: self.timeout_count,
            avg_latency_ms: self.avg_latency_ms(),
            p95_latency_ms: self.p95_latency_ms(),
            recovery_attempts: self.recovery_attempts,
            recovering: self.recovering,
            last_heartbeat: self.last_heartbeat,
        }
    }
}

/// What one periodic check cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckCycleReport {
    /// Workers probed this cycle.
    pub probed: usize,
    /// Workers skipped because their circuit was open.
    pub skipped_open: usize,
    /// Workers penalised for a missed heartbeat.
    pub missed_heartbeats: usize,
    /// Probes that failed or timed out.
    pub failed_probes: usize,
}

/// Tracks per-worker health scores and circuit breakers.
///
/// All state lives behind one `RwLock`; updates are applied in a single
/// critical section without awaiting, so a cancelled check cycle never leaves
/// a half-applied metric update behind.
pub struct HealthMonitor {
    config: HealthConfig,
    workers: RwLock<HashMap<String, HealthMetrics>>,
    probe: Arc<dyn LivenessProbe>,
    background: parking_lot::Mutex<Option<Supervised>>,
}

impl HealthMonitor {
    /// Monitor using `probe` for liveness checks. The loop is not started.
    pub fn new(config: HealthConfig, probe: Arc<dyn LivenessProbe>) -> Self {
        Self {
            config,
            workers: RwLock::new(HashMap::new()),
            probe,
            background: parking_lot::Mutex::new(None),
        }
    }

    /// Create a monitor that probes workers over HTTP.
    pub fn with_http_probe(config: HealthConfig) -> SwitchyardResult<Self> {
        let probe = HttpLivenessProbe::new(config.check_timeout())?;
        Ok(Self::new(config, Arc::new(probe)))
    }

    /// Configuration in use.
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Register a worker for periodic checks.
    ///
    /// Registering an id that already has metrics keeps them; only a missing
    /// descriptor is filled in. Returns `true` when a new record was created.
    pub async fn register_worker(&self, descriptor: WorkerDescriptor) -> bool {
        let mut workers = self.workers.write().await;
        match workers.get_mut(&descriptor.worker_id) {
            Some(existing) => {
                if existing.descriptor.is_none() {
                    existing.descriptor = Some(descriptor);
                }
                false
            }
            None => {
                info!(
                    worker_id = %descriptor.worker_id,
                    category = %descriptor.category,
                    "Worker registered with health monitor"
                );
                let id = descriptor.worker_id.clone();
                workers.insert(id, HealthMetrics::new(Some(descriptor), Instant::now()));
                true
            }
        }
    }

    /// Record the outcome of a real interaction with a worker.
    ///
    /// Creates the worker's record on first use.
    pub async fn record_interaction(&self, worker_id: &str, interaction: Interaction) {
        let now = Instant::now();
        let window = self.config.latency_window;
        let mut workers = self.workers.write().await;
        let metrics = workers
            .entry(worker_id.to_string())
            .or_insert_with(|| HealthMetrics::new(None, now));

        let promoted = metrics
            .circuit
            .evaluate(self.config.circuit_breaker.test_interval(), now);
        log_circuit(worker_id, promoted);

        let transition = if interaction.success {
            metrics.apply_success(interaction.latency, window, now);
            metrics.circuit.record_success()
        } else {
            metrics.apply_failure(interaction.error_kind, now);
            if let Some(latency) = interaction.latency {
                metrics.push_latency(latency, window);
            }
            metrics
                .circuit
                .record_failure(self.config.circuit_breaker.failure_threshold, now)
        };
        log_circuit(worker_id, transition);
        self.refresh_status(worker_id, metrics);
    }

    /// Snapshot of one worker, if it is known.
    pub async fn get_health(&self, worker_id: &str) -> Option<WorkerHealth> {
        let workers = self.workers.read().await;
        workers.get(worker_id).map(|m| m.snapshot(worker_id))
    }

    /// Workers whose score puts them in Degraded, Unhealthy or Dead.
    pub async fn list_unhealthy(&self) -> Vec<WorkerHealth> {
        let workers = self.workers.read().await;
        let mut list: Vec<WorkerHealth> = workers
            .iter()
            .filter(|(_, m)| m.status.needs_attention())
            .map(|(id, m)| m.snapshot(id))
            .collect();
        list.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        list
    }

    /// Snapshots of every known worker, sorted by id.
    pub async fn get_all_health(&self) -> Vec<WorkerHealth> {
        let workers = self.workers.read().await;
        let mut list: Vec<WorkerHealth> = workers.iter().map(|(id, m)| m.snapshot(id)).collect();
        list.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        list
    }

    /// Worker counts per status.
    pub async fn health_summary(&self) -> HealthSummary {
        let workers = self.workers.read().await;
        let mut summary = HealthSummary {
            total: workers.len(),
            ..HealthSummary::default()
        };
        for metrics in workers.values() {
            if metrics.recovering {
                summary.recovering += 1;
            } else {
                match metrics.status {
                    WorkerStatus::Healthy => summary.healthy += 1,
                    WorkerStatus::Degraded => summary.degraded += 1,
                    WorkerStatus::Unhealthy => summary.unhealthy += 1,
                    WorkerStatus::Dead => summary.dead += 1,
                    WorkerStatus::Recovering => summary.recovering += 1,
                }
            }
            if metrics.circuit.state() == CircuitState::Open {
                summary.open_circuits += 1;
            }
        }
        summary
    }

    /// Whether the worker's circuit lets a call through right now.
    ///
    /// Unknown workers are permitted; they get a record on their first interaction.
    pub async fn is_call_permitted(&self, worker_id: &str) -> bool {
        let workers = self.workers.read().await;
        workers.get(worker_id).map_or(true, |m| {
            m.circuit
                .allows_traffic(self.config.circuit_breaker.test_interval(), Instant::now())
        })
    }

    /// Mark a remediation as in flight and bump the attempt counter.
    pub async fn note_recovery_started(&self, worker_id: &str) -> u32 {
        let mut workers = self.workers.write().await;
        match workers.get_mut(worker_id) {
            Some(metrics) => {
                metrics.recovering = true;
                metrics.recovery_attempts += 1;
                metrics.recovery_attempts
            }
            None => 0,
        }
    }

    /// Clear the recovering flag after a remediation ends.
    pub async fn note_recovery_finished(&self, worker_id: &str) {
        let mut workers = self.workers.write().await;
        if let Some(metrics) = workers.get_mut(worker_id) {
            metrics.recovering = false;
        }
    }

    /// Zero the recovery attempt counter.
    pub async fn reset_recovery_attempts(&self, worker_id: &str) {
        let mut workers = self.workers.write().await;
        if let Some(metrics) = workers.get_mut(worker_id) {
            metrics.recovery_attempts = 0;
        }
    }

    /// Run one check cycle: probe every worker whose circuit is not open,
    /// apply heartbeat-miss penalties, then evaluate every circuit.
    pub async fn run_check_cycle(&self) -> CheckCycleReport {
        let mut report = CheckCycleReport::default();

        let targets: Vec<WorkerDescriptor> = {
            let workers = self.workers.read().await;
            workers
                .values()
                .filter(|m| {
                    let open = m.circuit.state() == CircuitState::Open;
                    if open {
                        report.skipped_open += 1;
                    }
                    !open
                })
                .filter_map(|m| m.descriptor.clone())
                .collect()
        };

        let check_timeout = self.config.check_timeout();
        let outcomes: HashMap<String, Result<Duration, ErrorKind>> =
            join_all(targets.iter().map(|worker| async move {
                let outcome = match tokio::time::timeout(check_timeout, self.probe.check(worker))
                    .await
                {
                    Ok(Ok(latency)) => Ok(latency),
                    Ok(Err(e)) => Err(e.kind()),
                    Err(_) => Err(ErrorKind::WorkerTimeout),
                };
                (worker.worker_id.clone(), outcome)
            }))
            .await
            .into_iter()
            .collect();
        report.probed = outcomes.len();

        let now = Instant::now();
        let grace = self.config.heartbeat_timeout();
        let threshold = self.config.circuit_breaker.failure_threshold;
        let window = self.config.latency_window;

        let mut workers = self.workers.write().await;
        for (worker_id, metrics) in workers.iter_mut() {
            // live traffic may have opened the circuit while probes were in flight
            if metrics.circuit.state() == CircuitState::Open {
                continue;
            }
            let missed = now.duration_since(metrics.last_contact) > grace;
            if missed {
                metrics.apply_heartbeat_miss();
                report.missed_heartbeats += 1;
                warn!(
                    worker_id = %worker_id,
                    score = metrics.score,
                    "Heartbeat missed"
                );
            }
            match outcomes.get(worker_id) {
                Some(Ok(latency)) => {
                    metrics.heartbeat_successes += 1;
                    metrics.apply_success(Some(*latency), window, now);
                    log_circuit(worker_id, metrics.circuit.record_success());
                }
                Some(Err(kind)) => {
                    report.failed_probes += 1;
                    // a miss in this cycle already counted the heartbeat failure
                    if !missed {
                        metrics.heartbeat_failures += 1;
                    }
                    metrics.apply_failure(Some(*kind), now);
                    log_circuit(worker_id, metrics.circuit.record_failure(threshold, now));
                    debug!(worker_id = %worker_id, error = %kind, "Liveness check failed");
                }
                None => {}
            }
            self.refresh_status(worker_id, metrics);
        }

        let test_interval = self.config.circuit_breaker.test_interval();
        for (worker_id, metrics) in workers.iter_mut() {
            log_circuit(worker_id, metrics.circuit.evaluate(test_interval, now));
        }

        report
    }

    /// Start the periodic check loop. A no-op while a loop is already running.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.background.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let monitor = Arc::downgrade(self);
        let interval = self.config.heartbeat_interval();
        *slot = Some(Supervised::spawn("health-monitor", move |shutdown| {
            monitor_loop(monitor, interval, shutdown)
        }));
    }

    /// Stop the periodic loop and wait for it to exit.
    pub async fn stop(&self) {
        let task = self.background.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }

    /// True while the periodic loop task is alive.
    pub fn is_running(&self) -> bool {
        self.background
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn refresh_status(&self, worker_id: &str, metrics: &mut HealthMetrics) {
        let status = WorkerStatus::from_score(metrics.score, &self.config.health_scoring);
        if status != metrics.status {
            info!(
                worker_id = %worker_id,
                from = %metrics.status,
                to = %status,
                score = metrics.score,
                "Worker status changed"
            );
            metrics.status = status;
        }
    }
}

fn log_circuit(worker_id: &str, transition: Option<Transition>) {
    if let Some(t) = transition {
        match t.to {
            CircuitState::Open => {
                warn!(worker_id = %worker_id, from = %t.from, "Circuit opened");
            }
            _ => info!(worker_id = %worker_id, from = %t.from, to = %t.to, "Circuit transition"),
        }
    }
}

async fn monitor_loop(
    monitor: Weak<HealthMonitor>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        let Some(monitor) = monitor.upgrade() else {
            break;
        };
        tokio::select! {
            _ = shutdown.changed() => break,
            report = monitor.run_check_cycle() => {
                debug!(
                    probed = report.probed,
                    skipped_open = report.skipped_open,
                    missed = report.missed_heartbeats,
                    "Health check cycle complete"
                );
            }
        }
    }
}
