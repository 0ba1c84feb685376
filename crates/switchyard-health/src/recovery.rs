use crate::monitor::HealthMonitor;
use crate::supervisor::Supervised;
use crate::types::{WorkerHealth, WorkerStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use switchyard_core::{RecoveryConfig, SwitchyardError, SwitchyardResult};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Remediation chosen for a worker, from its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Respawn the worker (dead workers).
    Restart,
    /// Reset worker state (unhealthy workers).
    Reset,
    /// Shift traffic elsewhere (degraded workers).
    Fallback,
    /// Leave it to an operator.
    Manual,
}

impl RecoveryStrategy {
    /// Strategy for a worker in `status`.
    pub fn for_status(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Dead => RecoveryStrategy::Restart,
            WorkerStatus::Unhealthy => RecoveryStrategy::Reset,
            WorkerStatus::Degraded => RecoveryStrategy::Fallback,
            WorkerStatus::Healthy | WorkerStatus::Recovering => RecoveryStrategy::Manual,
        }
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryStrategy::Restart => write!(f, "restart"),
            RecoveryStrategy::Reset => write!(f, "reset"),
            RecoveryStrategy::Fallback => write!(f, "fallback"),
            RecoveryStrategy::Manual => write!(f, "manual"),
        }
    }
}

/// Result of one remediation try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// The remediation worked.
    Success,
    /// The remediation ran and did not help, or errored.
    Failed,
    /// Some of the remediation took effect.
    Partial,
    /// An operator has to act.
    ManualRequired,
    /// Terminal: the attempt budget is spent and the worker is no longer considered.
    GaveUp,
}

/// One entry in a worker's recovery history. Never mutated after it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    /// Worker the attempt was for.
    pub worker_id: String,
    /// Strategy that was run.
    pub strategy: RecoveryStrategy,
    /// Attempt number, from 1.
    pub attempt: u32,
    /// When the attempt began, before its backoff.
    pub started_at: DateTime<Utc>,
    /// When the remediation returned.
    pub ended_at: DateTime<Utc>,
    /// What the remediation reported.
    pub outcome: RecoveryOutcome,
    /// Error message for failed or manual outcomes.
    pub error: Option<String>,
}

/// Hook that performs the actual remediation of a worker.
///
/// Every method defaults to [`RecoveryOutcome::ManualRequired`], so an embedder
/// only implements the strategies it can actually carry out. An `Err` is
/// recorded as a failed attempt.
#[async_trait]
pub trait Remediator: Send + Sync {
    /// Respawn a dead worker.
    async fn restart(&self, _worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
        Ok(RecoveryOutcome::ManualRequired)
    }

    /// Reset an unhealthy worker's state.
    async fn reset(&self, _worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
        Ok(RecoveryOutcome::ManualRequired)
    }

    /// Move a degraded worker's traffic elsewhere.
    async fn fallback(&self, _worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
        Ok(RecoveryOutcome::ManualRequired)
    }
}

/// Remediator for deployments that cannot remediate anything themselves.
pub struct NoopRemediator;

impl Remediator for NoopRemediator {}

/// Callback invoked after a successful recovery.
pub type RecoveryCallback = Arc<dyn Fn(&RecoveryAttempt) -> SwitchyardResult<()> + Send + Sync>;

#[derive(Default)]
struct WorkerRecoveryState {
    attempts: u32,
    gave_up: bool,
    history: Vec<RecoveryAttempt>,
}

/// Removes the worker from the in-flight set when the attempt ends or is cancelled.
struct InFlight<'a> {
    set: &'a parking_lot::Mutex<HashSet<String>>,
    worker_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.worker_id);
    }
}

/// Clears the monitor's `recovering` flag even if the attempt future is dropped
/// mid-sleep by a shutdown.
struct RecoveringFlag {
    monitor: Arc<HealthMonitor>,
    worker_id: Option<String>,
}

impl RecoveringFlag {
    async fn finish(mut self) {
        if let Some(worker_id) = self.worker_id.take() {
            self.monitor.note_recovery_finished(&worker_id).await;
        }
    }
}

impl Drop for RecoveringFlag {
    fn drop(&mut self) {
        if let Some(worker_id) = self.worker_id.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let monitor = Arc::clone(&self.monitor);
                handle.spawn(async move { monitor.note_recovery_finished(&worker_id).await });
            }
        }
    }
}

/// Periodically remediates workers the health monitor reports as unhealthy.
pub struct AutoRecovery {
    config: RecoveryConfig,
    monitor: Arc<HealthMonitor>,
    remediator: Arc<dyn Remediator>,
    state: parking_lot::Mutex<HashMap<String, WorkerRecoveryState>>,
    in_flight: parking_lot::Mutex<HashSet<String>>,
    callbacks: parking_lot::RwLock<HashMap<String, Vec<RecoveryCallback>>>,
    global_callbacks: parking_lot::RwLock<Vec<RecoveryCallback>>,
    background: parking_lot::Mutex<Option<Supervised>>,
}

impl AutoRecovery {
    /// Recovery over `monitor`, remediating through `remediator`. The loop is not started.
    pub fn new(
        config: RecoveryConfig,
        monitor: Arc<HealthMonitor>,
        remediator: Arc<dyn Remediator>,
    ) -> Self {
        Self {
            config,
            monitor,
            remediator,
            state: parking_lot::Mutex::new(HashMap::new()),
            in_flight: parking_lot::Mutex::new(HashSet::new()),
            callbacks: parking_lot::RwLock::new(HashMap::new()),
            global_callbacks: parking_lot::RwLock::new(Vec::new()),
            background: parking_lot::Mutex::new(None),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Register a callback fired when `worker_id` recovers successfully.
    pub fn register_callback(&self, worker_id: impl Into<String>, callback: RecoveryCallback) {
        self.callbacks
            .write()
            .entry(worker_id.into())
            .or_default()
            .push(callback);
    }

    /// Register a callback fired on every successful recovery.
    pub fn register_global_callback(&self, callback: RecoveryCallback) {
        self.global_callbacks.write().push(callback);
    }

    /// Recorded attempts for one worker, oldest first.
    pub fn history(&self, worker_id: &str) -> Vec<RecoveryAttempt> {
        self.state
            .lock()
            .get(worker_id)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Recorded attempts for every worker.
    pub fn all_history(&self) -> HashMap<String, Vec<RecoveryAttempt>> {
        self.state
            .lock()
            .iter()
            .map(|(id, s)| (id.clone(), s.history.clone()))
            .collect()
    }

    /// Attempts used in the current budget window.
    pub fn attempts_used(&self, worker_id: &str) -> u32 {
        self.state.lock().get(worker_id).map_or(0, |s| s.attempts)
    }

    /// True once the worker got a `GaveUp` record and has not been reset.
    pub fn has_given_up(&self, worker_id: &str) -> bool {
        self.state.lock().get(worker_id).is_some_and(|s| s.gave_up)
    }

    /// Give the worker a fresh attempt budget. History is kept.
    pub async fn reset_attempts(&self, worker_id: &str) {
        {
            let mut state = self.state.lock();
            if let Some(entry) = state.get_mut(worker_id) {
                entry.attempts = 0;
                entry.gave_up = false;
            }
        }
        self.monitor.reset_recovery_attempts(worker_id).await;
        info!(worker_id = %worker_id, "Recovery attempts reset");
    }

    /// Run one scan over every worker the monitor lists as unhealthy.
    ///
    /// Workers are attempted concurrently; the returned attempts are the ones
    /// recorded by this scan.
    pub async fn run_scan(&self) -> Vec<RecoveryAttempt> {
        if !self.config.enabled {
            return Vec::new();
        }
        let candidates: Vec<WorkerHealth> = self
            .monitor
            .list_unhealthy()
            .await
            .into_iter()
            .filter(|h| !self.has_given_up(&h.worker_id))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }
        debug!(candidates = candidates.len(), "Recovery scan");
        join_all(candidates.into_iter().map(|h| self.attempt_recovery(h)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Make one recovery attempt now, outside the periodic loop.
    pub async fn recover_now(&self, worker_id: &str) -> SwitchyardResult<RecoveryAttempt> {
        let health = self.monitor.get_health(worker_id).await.ok_or_else(|| {
            SwitchyardError::WorkerUnavailable {
                worker_id: worker_id.to_string(),
                reason: "not registered with the health monitor".into(),
            }
        })?;
        if self.has_given_up(worker_id) {
            return Err(self.exhausted(worker_id));
        }
        match self.attempt_recovery(health).await {
            Some(record) if record.outcome == RecoveryOutcome::GaveUp => {
                Err(self.exhausted(worker_id))
            }
            Some(record) => Ok(record),
            None => Err(SwitchyardError::WorkerUnavailable {
                worker_id: worker_id.to_string(),
                reason: "a recovery attempt is already in progress".into(),
            }),
        }
    }

    async fn attempt_recovery(&self, health: WorkerHealth) -> Option<RecoveryAttempt> {
        let worker_id = health.worker_id.clone();
        if !self.in_flight.lock().insert(worker_id.clone()) {
            debug!(worker_id = %worker_id, "Recovery already in flight");
            return None;
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            worker_id: worker_id.clone(),
        };

        let attempt = {
            let mut state = self.state.lock();
            let entry = state.entry(worker_id.clone()).or_default();
            if entry.gave_up {
                return None;
            }
            if entry.attempts >= self.config.max_recovery_attempts {
                entry.gave_up = true;
                let now = Utc::now();
                let record = RecoveryAttempt {
                    worker_id: worker_id.clone(),
                    strategy: RecoveryStrategy::for_status(health.status),
                    attempt: entry.attempts + 1,
                    started_at: now,
                    ended_at: now,
                    outcome: RecoveryOutcome::GaveUp,
                    error: Some(self.exhausted(&worker_id).to_string()),
                };
                entry.history.push(record.clone());
                warn!(
                    worker_id = %worker_id,
                    max = self.config.max_recovery_attempts,
                    "Giving up on worker recovery"
                );
                return Some(record);
            }
            entry.attempts += 1;
            entry.attempts
        };

        let strategy = RecoveryStrategy::for_status(health.status);
        let delay = self.config.backoff_for(attempt);
        let started_at = Utc::now();
        info!(
            worker_id = %worker_id,
            strategy = %strategy,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Attempting recovery"
        );

        self.monitor.note_recovery_started(&worker_id).await;
        let flag = RecoveringFlag {
            monitor: Arc::clone(&self.monitor),
            worker_id: Some(worker_id.clone()),
        };
        tokio::time::sleep(delay).await;
        let (outcome, error) = self.execute(strategy, &health).await;
        flag.finish().await;

        let record = RecoveryAttempt {
            worker_id: worker_id.clone(),
            strategy,
            attempt,
            started_at,
            ended_at: Utc::now(),
            outcome,
            error,
        };
        self.state
            .lock()
            .entry(worker_id.clone())
            .or_default()
            .history
            .push(record.clone());

        match outcome {
            RecoveryOutcome::Success => {
                info!(worker_id = %worker_id, strategy = %strategy, attempt, "Worker recovered");
                self.fire_callbacks(&record);
            }
            _ => warn!(
                worker_id = %worker_id,
                strategy = %strategy,
                attempt,
                outcome = ?outcome,
                error = record.error.as_deref().unwrap_or(""),
                "Recovery attempt did not succeed"
            ),
        }
        Some(record)
    }

    async fn execute(
        &self,
        strategy: RecoveryStrategy,
        health: &WorkerHealth,
    ) -> (RecoveryOutcome, Option<String>) {
        let result = match strategy {
            RecoveryStrategy::Restart => self.remediator.restart(health).await,
            RecoveryStrategy::Reset => self.remediator.reset(health).await,
            RecoveryStrategy::Fallback => self.remediator.fallback(health).await,
            RecoveryStrategy::Manual => Ok(RecoveryOutcome::ManualRequired),
        };
        match result {
            Ok(RecoveryOutcome::ManualRequired) => (
                RecoveryOutcome::ManualRequired,
                Some(
                    SwitchyardError::ManualInterventionRequired(health.worker_id.clone())
                        .to_string(),
                ),
            ),
            Ok(outcome) => (outcome, None),
            Err(e) => (RecoveryOutcome::Failed, Some(e.to_string())),
        }
    }

    fn fire_callbacks(&self, record: &RecoveryAttempt) {
        let mut callbacks: Vec<RecoveryCallback> = self
            .callbacks
            .read()
            .get(&record.worker_id)
            .cloned()
            .unwrap_or_default();
        callbacks.extend(self.global_callbacks.read().iter().cloned());

        for callback in callbacks {
            match std::panic::catch_unwind(AssertUnwindSafe(|| callback(record))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(worker_id = %record.worker_id, error = %e, "Recovery callback failed");
                }
                Err(_) => {
                    error!(worker_id = %record.worker_id, "Recovery callback panicked");
                }
            }
        }
    }

    fn exhausted(&self, worker_id: &str) -> SwitchyardError {
        SwitchyardError::MaxRecoveryAttemptsExceeded {
            worker_id: worker_id.to_string(),
            max: self.config.max_recovery_attempts,
        }
    }

    /// Start the periodic recovery loop. A no-op while a loop is already running.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("Auto recovery disabled");
            return;
        }
        let mut slot = self.background.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let recovery = Arc::downgrade(self);
        let interval = self.config.check_interval();
        *slot = Some(Supervised::spawn("auto-recovery", move |shutdown| {
            recovery_loop(recovery, interval, shutdown)
        }));
    }

    /// Stop the loop and wait for it to exit. An in-flight backoff sleep is abandoned.
    pub async fn stop(&self) {
        let task = self.background.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }

    /// True while the control loop task is alive.
    pub fn is_running(&self) -> bool {
        self.background
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

async fn recovery_loop(
    recovery: Weak<AutoRecovery>,
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
        let Some(recovery) = recovery.upgrade() else {
            break;
        };
        tokio::select! {
            _ = shutdown.changed() => break,
            attempts = recovery.run_scan() => {
                if !attempts.is_empty() {
                    debug!(attempts = attempts.len(), "Recovery scan complete");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::probe::LivenessProbe;
    use crate::types::Interaction;
    use std::sync::atomic::{AtomicU32, Ordering};
    use switchyard_core::{ErrorKind, HealthConfig, WorkerDescriptor};

    struct DownProbe;

    #[async_trait]
    impl LivenessProbe for DownProbe {
        async fn check(&self, worker: &WorkerDescriptor) -> SwitchyardResult<Duration> {
            Err(SwitchyardError::WorkerUnavailable {
                worker_id: worker.worker_id.clone(),
                reason: "down".into(),
            })
        }
    }

    #[derive(Default)]
    struct CountingRemediator {
        restarts: AtomicU32,
        resets: AtomicU32,
        fallbacks: AtomicU32,
        outcome: parking_lot::Mutex<Option<RecoveryOutcome>>,
    }

    impl CountingRemediator {
        fn returning(outcome: RecoveryOutcome) -> Arc<Self> {
            let r = Self::default();
            *r.outcome.lock() = Some(outcome);
            Arc::new(r)
        }

        fn total(&self) -> u32 {
            self.restarts.load(Ordering::SeqCst)
                + self.resets.load(Ordering::SeqCst)
                + self.fallbacks.load(Ordering::SeqCst)
        }

        fn result(&self) -> SwitchyardResult<RecoveryOutcome> {
            Ok(self.outcome.lock().unwrap_or(RecoveryOutcome::Failed))
        }
    }

    #[async_trait]
    impl Remediator for CountingRemediator {
        async fn restart(&self, _worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            self.result()
        }

        async fn reset(&self, _worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            self.result()
        }

        async fn fallback(&self, _worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
            self.fallbacks.fetch_add(1, Ordering::SeqCst);
            self.result()
        }
    }

    async fn monitor_with_failures(worker_id: &str, failures: usize) -> Arc<HealthMonitor> {
        let monitor = Arc::new(HealthMonitor::new(HealthConfig::default(), Arc::new(DownProbe)));
        monitor
            .register_worker(WorkerDescriptor::new(worker_id, "sports", "http://localhost:1"))
            .await;
        for _ in 0..failures {
            monitor
                .record_interaction(worker_id, Interaction::failure(ErrorKind::WorkerFailure))
                .await;
        }
        monitor
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            RecoveryStrategy::for_status(WorkerStatus::Dead),
            RecoveryStrategy::Restart
        );
        assert_eq!(
            RecoveryStrategy::for_status(WorkerStatus::Unhealthy),
            RecoveryStrategy::Reset
        );
        assert_eq!(
            RecoveryStrategy::for_status(WorkerStatus::Degraded),
            RecoveryStrategy::Fallback
        );
        assert_eq!(
            RecoveryStrategy::for_status(WorkerStatus::Recovering),
            RecoveryStrategy::Manual
        );
        assert_eq!(
            RecoveryStrategy::for_status(WorkerStatus::Healthy),
            RecoveryStrategy::Manual
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_follows_status() {
        // 13 failures: score 35 -> unhealthy -> reset
        let monitor = monitor_with_failures("w", 13).await;
        let remediator = CountingRemediator::returning(RecoveryOutcome::Failed);
        let recovery = AutoRecovery::new(RecoveryConfig::default(), monitor, remediator.clone());

        let attempts = recovery.run_scan().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].strategy, RecoveryStrategy::Reset);
        assert_eq!(attempts[0].outcome, RecoveryOutcome::Failed);
        assert_eq!(remediator.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_remediator_requires_manual_intervention() {
        let monitor = monitor_with_failures("w", 20).await;
        let recovery = AutoRecovery::new(
            RecoveryConfig::default(),
            monitor.clone(),
            Arc::new(NoopRemediator),
        );
        let attempt = recovery.recover_now("w").await.unwrap();
        assert_eq!(attempt.strategy, RecoveryStrategy::Restart);
        assert_eq!(attempt.outcome, RecoveryOutcome::ManualRequired);
        assert!(attempt.error.unwrap().contains("Manual intervention"));
        let health = monitor.get_health("w").await.unwrap();
        assert_eq!(health.recovery_attempts, 1);
        assert!(!health.recovering);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_strategy_skips_remediator() {
        let monitor = monitor_with_failures("w", 0).await;
        let remediator = CountingRemediator::returning(RecoveryOutcome::Success);
        let recovery = AutoRecovery::new(RecoveryConfig::default(), monitor, remediator.clone());
        // healthy worker forced through recover_now -> manual
        let attempt = recovery.recover_now("w").await.unwrap();
        assert_eq!(attempt.strategy, RecoveryStrategy::Manual);
        assert_eq!(attempt.outcome, RecoveryOutcome::ManualRequired);
        assert_eq!(remediator.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callbacks_fire_on_success_and_survive_panics() {
        let monitor = monitor_with_failures("w", 8).await;
        let remediator = CountingRemediator::returning(RecoveryOutcome::Success);
        let recovery = AutoRecovery::new(RecoveryConfig::default(), monitor, remediator);

        let fired = Arc::new(AtomicU32::new(0));
        recovery.register_callback(
            "w",
            Arc::new(|_attempt: &RecoveryAttempt| -> SwitchyardResult<()> {
                panic!("callback bug")
            }),
        );
        recovery.register_callback(
            "w",
            Arc::new(|_attempt: &RecoveryAttempt| -> SwitchyardResult<()> {
                Err(SwitchyardError::Internal("callback failed".into()))
            }),
        );
        let counter = fired.clone();
        recovery.register_global_callback(Arc::new(
            move |attempt: &RecoveryAttempt| -> SwitchyardResult<()> {
                assert_eq!(attempt.outcome, RecoveryOutcome::Success);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ));

        let attempts = recovery.run_scan().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, RecoveryOutcome::Success);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remediator_error_recorded_as_failure() {
        struct Broken;

        #[async_trait]
        impl Remediator for Broken {
            async fn restart(&self, _w: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
                Err(SwitchyardError::Internal("supervisor unreachable".into()))
            }
        }

        let monitor = monitor_with_failures("w", 20).await;
        let recovery = AutoRecovery::new(RecoveryConfig::default(), monitor, Arc::new(Broken));
        let attempt = recovery.recover_now("w").await.unwrap();
        assert_eq!(attempt.outcome, RecoveryOutcome::Failed);
        assert!(attempt.error.unwrap().contains("supervisor unreachable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_now_unknown_worker() {
        let monitor = monitor_with_failures("w", 0).await;
        let recovery = AutoRecovery::new(
            RecoveryConfig::default(),
            monitor,
            Arc::new(NoopRemediator),
        );
        let err = recovery.recover_now("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorkerUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_recovery_does_nothing() {
        let monitor = monitor_with_failures("w", 20).await;
        let remediator = CountingRemediator::returning(RecoveryOutcome::Success);
        let config = RecoveryConfig {
            enabled: false,
            ..RecoveryConfig::default()
        };
        let recovery = Arc::new(AutoRecovery::new(config, monitor, remediator.clone()));
        assert!(recovery.run_scan().await.is_empty());
        recovery.start();
        assert!(!recovery.is_running());
        assert_eq!(remediator.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_backoff_clears_recovering_flag() {
        let monitor = monitor_with_failures("w", 20).await;
        let remediator = CountingRemediator::returning(RecoveryOutcome::Success);
        let recovery = Arc::new(AutoRecovery::new(
            RecoveryConfig::default(),
            monitor.clone(),
            remediator.clone(),
        ));

        recovery.start();
        // first tick fires immediately; the attempt is now in its 5s backoff
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(monitor.get_health("w").await.unwrap().recovering);

        recovery.stop().await;
        assert!(!recovery.is_running());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!monitor.get_health("w").await.unwrap().recovering);
        assert_eq!(remediator.total(), 0);
    }
}
