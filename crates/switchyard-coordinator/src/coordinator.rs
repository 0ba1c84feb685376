use crate::task::{TaskKind, TaskRequest};
use crate::transport::{HttpTransport, WorkerTransport};
use crate::utility::UtilityClient;
use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use switchyard_core::{
    CoordinationResult, CoordinationStatus, CoordinatorConfig, SwitchyardError, SwitchyardResult,
    WorkerCallResult, WorkerDescriptor,
};
use switchyard_health::{HealthMonitor, Interaction};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Runs workflow definitions submitted through the `workflow` task kind.
#[async_trait]
pub trait WorkflowDelegate: Send + Sync {
    /// Execute `definition` to completion and summarise the run.
    async fn run_workflow(&self, definition: Value) -> CoordinationResult;
}

#[derive(Default)]
struct KindCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    partials: AtomicU64,
    errors: AtomicU64,
}

/// Counter snapshot for one task kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    /// Calls routed to this kind.
    pub requests: u64,
    /// Calls that ended `success`.
    pub successes: u64,
    /// Calls that ended `partial`.
    pub partials: u64,
    /// Calls that ended `error`.
    pub errors: u64,
}

/// Counter snapshot for the whole coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Per-kind counters, keyed by kind name.
    pub kinds: BTreeMap<String, KindStats>,
    /// Calls naming a task type outside the known set.
    pub unknown_task_types: u64,
    /// Workers currently in the registry.
    pub registered_workers: usize,
}

/// Routes tasks to worker services and aggregates their answers.
///
/// One instance per process, constructed by whoever owns the lifecycle and
/// shared by `Arc`. Every path out of [`Coordinator::coordinate`] is a
/// [`CoordinationResult`]; handler panics are caught and reported as errors.
pub struct Coordinator {
    config: CoordinatorConfig,
    transport: Arc<dyn WorkerTransport>,
    workers: parking_lot::RwLock<BTreeMap<String, WorkerDescriptor>>,
    monitor: Option<Arc<HealthMonitor>>,
    utility: UtilityClient,
    workflows: parking_lot::RwLock<Option<Weak<dyn WorkflowDelegate>>>,
    counters: [KindCounters; TaskKind::ALL.len()],
    unknown_task_types: AtomicU64,
}

impl Coordinator {
    /// Coordinator over an arbitrary transport.
    pub fn new(
        config: CoordinatorConfig,
        transport: Arc<dyn WorkerTransport>,
    ) -> SwitchyardResult<Self> {
        let utility = UtilityClient::new(&config.utility)?;
        Ok(Self {
            config,
            transport,
            workers: parking_lot::RwLock::new(BTreeMap::new()),
            monitor: None,
            utility,
            workflows: parking_lot::RwLock::new(None),
            counters: Default::default(),
            unknown_task_types: AtomicU64::new(0),
        })
    }

    /// Coordinator that reaches workers over HTTP.
    pub fn with_http(config: CoordinatorConfig) -> SwitchyardResult<Self> {
        Self::new(config, Arc::new(HttpTransport::new()?))
    }

    /// Report every worker interaction to `monitor` and respect its circuits.
    pub fn with_monitor(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Attached health monitor, if any.
    pub fn monitor(&self) -> Option<&Arc<HealthMonitor>> {
        self.monitor.as_ref()
    }

    /// Client used by the `utility` kind.
    pub fn utility(&self) -> &UtilityClient {
        &self.utility
    }

    /// Attach the engine that serves the `workflow` kind.
    pub fn attach_workflows(&self, delegate: Weak<dyn WorkflowDelegate>) {
        *self.workflows.write() = Some(delegate);
    }

    /// Register a worker for its category (and with the health monitor, if any).
    pub async fn register_worker(&self, worker: WorkerDescriptor) {
        info!(
            worker_id = %worker.worker_id,
            category = %worker.category,
            endpoint = %worker.endpoint,
            "Worker registered"
        );
        self.workers
            .write()
            .insert(worker.worker_id.clone(), worker.clone());
        if let Some(monitor) = &self.monitor {
            monitor.register_worker(worker).await;
        }
    }

    /// Remove a worker from routing. Its health record is kept.
    pub fn deregister_worker(&self, worker_id: &str) -> bool {
        self.workers.write().remove(worker_id).is_some()
    }

    /// Registered workers serving `kind`, ordered by id.
    pub fn workers_for(&self, kind: TaskKind) -> Vec<WorkerDescriptor> {
        self.workers
            .read()
            .values()
            .filter(|w| w.category.eq_ignore_ascii_case(kind.as_str()))
            .cloned()
            .collect()
    }

    /// All registered workers, sorted by id.
    pub fn workers(&self) -> Vec<WorkerDescriptor> {
        self.workers.read().values().cloned().collect()
    }

    /// Route one task. Never panics and never returns an error out of band.
    pub async fn coordinate(&self, task_type: &str, payload: Value) -> CoordinationResult {
        let kind = match task_type.parse::<TaskKind>() {
            Ok(kind) => kind,
            Err(e) => {
                self.unknown_task_types.fetch_add(1, Ordering::Relaxed);
                warn!(task_type = %task_type, "Unknown task type");
                return CoordinationResult::from_error(task_type, &e);
            }
        };
        let counters = &self.counters[kind.index()];
        counters.requests.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let result = match AssertUnwindSafe(self.dispatch(kind, payload))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(task_type = %kind, panic = %message, "Task handler panicked");
                CoordinationResult::from_error(
                    kind.as_str(),
                    &SwitchyardError::Internal(format!("{kind} handler panicked: {message}")),
                )
            }
        };

        match result.status {
            CoordinationStatus::Success => counters.successes.fetch_add(1, Ordering::Relaxed),
            CoordinationStatus::Partial => counters.partials.fetch_add(1, Ordering::Relaxed),
            CoordinationStatus::Error => counters.errors.fetch_add(1, Ordering::Relaxed),
        };
        info!(
            task_type = %kind,
            status = ?result.status,
            workers = result.per_worker_results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Task coordinated"
        );
        result
    }

    /// Snapshot of the per-kind counters.
    pub fn stats(&self) -> CoordinatorStats {
        let kinds = TaskKind::ALL
            .into_iter()
            .map(|kind| {
                let c = &self.counters[kind.index()];
                (
                    kind.as_str().to_string(),
                    KindStats {
                        requests: c.requests.load(Ordering::Relaxed),
                        successes: c.successes.load(Ordering::Relaxed),
                        partials: c.partials.load(Ordering::Relaxed),
                        errors: c.errors.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        CoordinatorStats {
            kinds,
            unknown_task_types: self.unknown_task_types.load(Ordering::Relaxed),
            registered_workers: self.workers.read().len(),
        }
    }

    async fn dispatch(&self, kind: TaskKind, payload: Value) -> CoordinationResult {
        let request = match TaskRequest::parse(kind, payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(task_type = %kind, error = %e, "Rejected task payload");
                return CoordinationResult::from_error(kind.as_str(), &e);
            }
        };

        match request {
            TaskRequest::Utility(req) => match self.utility.call(&req).await {
                Ok(data) => CoordinationResult::success(kind.as_str(), data),
                Err(e) => CoordinationResult::from_error(kind.as_str(), &e),
            },
            TaskRequest::Workflow(definition) => {
                let delegate = self.workflows.read().as_ref().and_then(Weak::upgrade);
                match delegate {
                    Some(engine) => engine.run_workflow(definition).await,
                    None => CoordinationResult::from_error(
                        kind.as_str(),
                        &SwitchyardError::WorkerUnavailable {
                            worker_id: kind.as_str().to_string(),
                            reason: "no workflow engine attached".into(),
                        },
                    ),
                }
            }
            worker_task => self.fan_out(&worker_task).await,
        }
    }

    async fn fan_out(&self, request: &TaskRequest) -> CoordinationResult {
        let kind = request.kind();
        let (Some(verb), Some(body)) = (kind.verb(), request.worker_body()) else {
            return CoordinationResult::from_error(
                kind.as_str(),
                &SwitchyardError::Internal(format!("{kind} is not served by workers")),
            );
        };

        let workers = self.workers_for(kind);
        if workers.is_empty() {
            return CoordinationResult::from_error(
                kind.as_str(),
                &SwitchyardError::WorkerUnavailable {
                    worker_id: kind.as_str().to_string(),
                    reason: "no workers registered for this category".into(),
                },
            );
        }

        let results = join_all(workers.iter().map(|w| self.call_worker(w, verb, &body))).await;
        aggregate(kind, results)
    }

    async fn call_worker(
        &self,
        worker: &WorkerDescriptor,
        verb: &str,
        body: &Value,
    ) -> WorkerCallResult {
        if let Some(monitor) = &self.monitor {
            if !monitor.is_call_permitted(&worker.worker_id).await {
                let err = SwitchyardError::WorkerUnavailable {
                    worker_id: worker.worker_id.clone(),
                    reason: "circuit open".into(),
                };
                return WorkerCallResult::failure(&worker.worker_id, &err, 0);
            }
        }

        let timeout = self.config.worker_timeout();
        let started = Instant::now();
        let call =
            AssertUnwindSafe(self.transport.call(worker, verb, body, timeout)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(SwitchyardError::Internal(format!(
                "transport panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(SwitchyardError::WorkerTimeout {
                worker_id: worker.worker_id.clone(),
                timeout,
            }),
        };
        let latency = started.elapsed();
        let latency_ms = latency.as_millis() as u64;

        let interaction = match &outcome {
            Ok(_) => Interaction::success(latency),
            Err(e) => {
                warn!(worker_id = %worker.worker_id, error = %e, "Worker call failed");
                Interaction::failure(e.kind()).with_latency(latency)
            }
        };
        self.report(&worker.worker_id, interaction);

        match outcome {
            Ok(data) => WorkerCallResult::success(&worker.worker_id, data, latency_ms),
            Err(e) => WorkerCallResult::failure(&worker.worker_id, &e, latency_ms),
        }
    }

    /// Fire-and-forget: the coordination path never waits on the monitor.
    fn report(&self, worker_id: &str, interaction: Interaction) {
        if let Some(monitor) = &self.monitor {
            let monitor = Arc::clone(monitor);
            let worker_id = worker_id.to_string();
            tokio::spawn(async move {
                monitor.record_interaction(&worker_id, interaction).await;
            });
        }
    }
}

/// Combine settled worker calls into one result.
///
/// All failed: a single-worker fan-out surfaces that worker's error, larger
/// fan-outs an `AggregateFailure`. Otherwise `data` carries the first
/// successful answer's fields plus `results`, counts and kind-specific blocks.
fn aggregate(kind: TaskKind, results: Vec<WorkerCallResult>) -> CoordinationResult {
    let successes: Vec<&Value> = results
        .iter()
        .filter(|r| r.is_success())
        .filter_map(|r| r.data.as_ref())
        .collect();
    let failures = results.len() - successes.len();

    if successes.is_empty() {
        if let [only] = results.as_slice() {
            return CoordinationResult {
                status: CoordinationStatus::Error,
                task_type: kind.as_str().to_string(),
                data: None,
                error: only.error.clone(),
                error_kind: only.error_kind,
                per_worker_results: Vec::new(),
            }
            .with_worker_results(results);
        }
        let summary = results
            .iter()
            .map(|r| format!("{}: {}", r.worker_id, r.error.as_deref().unwrap_or("unknown error")))
            .collect::<Vec<_>>()
            .join("; ");
        let err = SwitchyardError::AggregateFailure {
            attempted: results.len(),
            summary,
        };
        return CoordinationResult::from_error(kind.as_str(), &err).with_worker_results(results);
    }

    let mut data = Map::new();
    data.insert("results".into(), Value::Array(successes.iter().map(|v| (*v).clone()).collect()));
    data.insert("successCount".into(), json!(successes.len()));
    data.insert("failureCount".into(), json!(failures));
    match kind {
        TaskKind::Reviewer => {
            data.insert("consensus".into(), review_consensus(&successes));
        }
        TaskKind::Crypto => {
            if let Some(price) = mean_of(&successes, "price") {
                data.insert("price".into(), json!(price));
            }
        }
        _ => {}
    }
    if let Some(Value::Object(first)) = successes.first() {
        for (k, v) in first {
            data.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    let status = if failures == 0 {
        CoordinationStatus::Success
    } else {
        CoordinationStatus::Partial
    };
    let mut result = CoordinationResult::success(kind.as_str(), Value::Object(data));
    result.status = status;
    result.with_worker_results(results)
}

fn review_consensus(reviews: &[&Value]) -> Value {
    let approved = reviews
        .iter()
        .all(|r| r.get("approved").and_then(Value::as_bool).unwrap_or(false));
    json!({
        "score": mean_of(reviews, "score"),
        "approved": approved,
        "reviewers": reviews.len(),
    })
}

fn mean_of(values: &[&Value], field: &str) -> Option<f64> {
    let numbers: Vec<f64> = values
        .iter()
        .filter_map(|v| v.get(field).and_then(Value::as_f64))
        .collect();
    if numbers.is_empty() {
        None
    } else {
        Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
