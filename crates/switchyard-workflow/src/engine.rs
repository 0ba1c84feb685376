use crate::definition::{StepDefinition, WorkflowDefinition, WorkflowType};
use crate::executor::{call_step, CallFailure, StepExecutor};
use crate::graph;
use crate::types::{StepStatus, WorkflowOutcome, WorkflowRun, WorkflowStatus, WorkflowStep};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use switchyard_coordinator::{Coordinator, WorkflowDelegate};
use switchyard_core::{
    CoordinationResult, CoordinationStatus, ErrorKind, SwitchyardError, SwitchyardResult,
    WorkflowConfig,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

struct ActiveRun {
    snapshot: WorkflowRun,
    cancel: Arc<AtomicBool>,
}

/// Finalises a run whose executing future is dropped (or unwinds) before it
/// terminates, so it never lingers in the active map.
struct AbandonGuard<'a> {
    engine: &'a WorkflowEngine,
    run_id: String,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(active) = self.engine.active.write().remove(&self.run_id) else {
            return;
        };
        let mut run = active.snapshot;
        let err = SwitchyardError::WorkflowAborted("run abandoned before it finished".into());
        for step in &mut run.steps {
            if step.status == StepStatus::InProgress {
                step.status = StepStatus::Failed;
                step.error = Some(err.to_string());
                step.error_kind = Some(err.kind());
                step.completed_at = Some(Utc::now());
            }
        }
        run.status = WorkflowStatus::Cancelled;
        run.error = Some(err.to_string());
        run.error_kind = Some(err.kind());
        run.completed_at = Some(Utc::now());
        warn!(workflow_id = %run.id, "Workflow abandoned by its caller");
        self.engine.completed.write().insert(run.id.clone(), run);
    }
}

/// Executes workflow definitions step by step through a [`StepExecutor`].
///
/// Runs live in an active map while executing (as snapshots published after
/// every step or wave) and move to the completed map when they terminate.
/// The run itself is owned by the task executing it; concurrent steps each
/// own their `WorkflowStep` until they hand it back.
pub struct WorkflowEngine {
    executor: Arc<dyn StepExecutor>,
    config: WorkflowConfig,
    active: parking_lot::RwLock<HashMap<String, ActiveRun>>,
    completed: parking_lot::RwLock<HashMap<String, WorkflowRun>>,
}

impl WorkflowEngine {
    /// Engine over any executor. Use [`WorkflowEngine::attach`] to run through a coordinator.
    pub fn new(executor: Arc<dyn StepExecutor>, config: WorkflowConfig) -> Self {
        Self {
            executor,
            config,
            active: parking_lot::RwLock::new(HashMap::new()),
            completed: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Build an engine over `coordinator` and register it as the handler
    /// for the coordinator's `workflow` task kind.
    pub fn attach(coordinator: Arc<Coordinator>, config: WorkflowConfig) -> Arc<Self> {
        let engine = Arc::new(Self::new(coordinator.clone(), config));
        let handler: Arc<dyn WorkflowDelegate> = engine.clone();
        let delegate: Weak<dyn WorkflowDelegate> = Arc::downgrade(&handler);
        coordinator.attach_workflows(delegate);
        engine
    }

    /// Configuration in use.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Parse and run a JSON workflow definition.
    pub async fn execute_json(&self, definition: Value) -> SwitchyardResult<WorkflowOutcome> {
        let definition = WorkflowDefinition::from_value(definition)?;
        self.execute_workflow(definition).await
    }

    /// Run a workflow to termination.
    ///
    /// Only an invalid definition is an `Err`; step failures, cycles and
    /// cancellation are reported through the outcome's status.
    pub async fn execute_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> SwitchyardResult<WorkflowOutcome> {
        definition.validate()?;

        let mut run = WorkflowRun::new(definition);
        let cancel = Arc::new(AtomicBool::new(false));
        run.status = WorkflowStatus::Running;
        run.started_at = Some(Utc::now());
        self.active.write().insert(
            run.id.clone(),
            ActiveRun {
                snapshot: run.clone(),
                cancel: cancel.clone(),
            },
        );
        let guard = AbandonGuard {
            engine: self,
            run_id: run.id.clone(),
            armed: true,
        };

        info!(
            workflow_id = %run.id,
            workflow = %run.name,
            mode = ?run.workflow_type,
            steps = run.steps.len(),
            "Workflow started"
        );

        let started = Instant::now();
        match run.workflow_type {
            WorkflowType::Sequential => self.run_sequential(&mut run, &cancel).await,
            WorkflowType::Parallel => self.run_parallel(&mut run, &cancel).await,
            WorkflowType::Hybrid => self.run_hybrid(&mut run, &cancel).await,
        }
        run.completed_at = Some(Utc::now());
        run.execution_time_seconds = Some(started.elapsed().as_secs_f64());

        match run.status {
            WorkflowStatus::Completed => info!(
                workflow_id = %run.id,
                elapsed_s = run.execution_time_seconds,
                "Workflow completed"
            ),
            status => warn!(
                workflow_id = %run.id,
                status = %status,
                error = run.error.as_deref().unwrap_or(""),
                "Workflow finished without full success"
            ),
        }

        let outcome = WorkflowOutcome::from(&run);
        self.active.write().remove(&run.id);
        self.completed.write().insert(run.id.clone(), run);
        guard.disarm();
        Ok(outcome)
    }

    /// Current state of a run, active or finished.
    pub fn get_workflow(&self, workflow_id: &str) -> Option<WorkflowRun> {
        if let Some(active) = self.active.read().get(workflow_id) {
            return Some(active.snapshot.clone());
        }
        self.completed.read().get(workflow_id).cloned()
    }

    /// Snapshots of running workflows, oldest first.
    pub fn list_active(&self) -> Vec<WorkflowRun> {
        let mut runs: Vec<WorkflowRun> = self
            .active
            .read()
            .values()
            .map(|a| a.snapshot.clone())
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        runs
    }

    /// Finished runs, oldest first.
    pub fn list_completed(&self) -> Vec<WorkflowRun> {
        let mut runs: Vec<WorkflowRun> = self.completed.read().values().cloned().collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        runs
    }

    /// Ask a running workflow to stop before its next step or wave.
    /// Returns false when no active run has this id.
    pub fn cancel_workflow(&self, workflow_id: &str) -> bool {
        match self.active.read().get(workflow_id) {
            Some(active) => {
                active.cancel.store(true, Ordering::SeqCst);
                info!(workflow_id = %workflow_id, "Workflow cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Roll back the completed steps of a finished run and mark it `RolledBack`.
    pub async fn rollback_workflow(&self, workflow_id: &str) -> SwitchyardResult<WorkflowOutcome> {
        let mut run = {
            let mut completed = self.completed.write();
            let Some(run) = completed.get_mut(workflow_id) else {
                let reason = if self.active.read().contains_key(workflow_id) {
                    format!("workflow '{workflow_id}' is still running")
                } else {
                    format!("unknown workflow '{workflow_id}'")
                };
                return Err(SwitchyardError::InvalidWorkflow(reason));
            };
            if run.status == WorkflowStatus::RolledBack {
                return Err(SwitchyardError::InvalidWorkflow(format!(
                    "workflow '{workflow_id}' was already rolled back"
                )));
            }
            // claimed under the lock so a concurrent call cannot compensate twice
            run.status = WorkflowStatus::RolledBack;
            run.clone()
        };

        self.roll_back(&mut run).await;
        run.status = WorkflowStatus::RolledBack;
        let outcome = WorkflowOutcome::from(&run);
        self.completed.write().insert(run.id.clone(), run);
        info!(workflow_id = %workflow_id, "Workflow rolled back on request");
        Ok(outcome)
    }

    async fn run_sequential(&self, run: &mut WorkflowRun, cancel: &AtomicBool) {
        let mut previous: Option<Value> = None;

        for idx in 0..run.steps.len() {
            if cancel.load(Ordering::SeqCst) {
                self.mark_cancelled(run);
                return;
            }
            if !self.guard_allows(run, idx) {
                continue;
            }

            run.steps[idx].status = StepStatus::InProgress;
            self.publish(run);

            let step = run.steps[idx].clone();
            let input = if step.definition.use_previous_output {
                previous.clone()
            } else {
                None
            };
            let step = self.run_step(&run.id, step, input).await;
            let failed = step.status == StepStatus::Failed;
            if !failed {
                previous = step.result.clone();
                run.completion_order.push(idx);
            }
            run.steps[idx] = step;

            if failed {
                self.fail_run(run, idx).await;
                return;
            }
        }
        run.status = WorkflowStatus::Completed;
    }

    async fn run_parallel(&self, run: &mut WorkflowRun, cancel: &AtomicBool) {
        if cancel.load(Ordering::SeqCst) {
            self.mark_cancelled(run);
            return;
        }

        let all: Vec<usize> = (0..run.steps.len()).collect();
        self.run_wave(run, &all).await;

        let successes = run.steps.iter().filter(|s| s.succeeded()).count();
        let failures = run.steps.len() - successes;
        run.status = if successes == 0 {
            WorkflowStatus::Failed
        } else if failures > 0 {
            WorkflowStatus::PartialSuccess
        } else {
            WorkflowStatus::Completed
        };

        if failures > 0 {
            if let Some(idx) = run.steps.iter().position(|s| s.status == StepStatus::Failed) {
                let step = &run.steps[idx];
                run.error = Some(format!("{failures} step(s) failed; first: {}", step_error(step)));
                run.error_kind = step.error_kind;
            }
            if run.rollback_on_failure {
                self.roll_back(run).await;
            }
        }
    }

    async fn run_hybrid(&self, run: &mut WorkflowRun, cancel: &AtomicBool) {
        loop {
            if run.steps.iter().all(|s| s.status != StepStatus::Pending) {
                run.status = WorkflowStatus::Completed;
                return;
            }
            if cancel.load(Ordering::SeqCst) {
                self.mark_cancelled(run);
                return;
            }

            let ready = graph::ready_steps(&run.steps);
            if ready.is_empty() {
                let stuck = graph::pending_ids(&run.steps);
                if let Some(cycle) = graph::find_cycle(&run.steps) {
                    debug!(workflow_id = %run.id, cycle = ?cycle, "Dependency cycle");
                }
                error!(workflow_id = %run.id, stuck = ?stuck, "No step can become ready");
                let err = SwitchyardError::CircularDependency(stuck);
                run.status = WorkflowStatus::Failed;
                run.error = Some(err.to_string());
                run.error_kind = Some(err.kind());
                if run.rollback_on_failure {
                    self.roll_back(run).await;
                }
                return;
            }

            let runnable: Vec<usize> = ready
                .into_iter()
                .filter(|&idx| self.guard_allows(run, idx))
                .collect();
            if runnable.is_empty() {
                // every ready step was skipped; re-evaluate
                continue;
            }

            let first_failure = self.run_wave(run, &runnable).await;
            if let Some(idx) = first_failure {
                self.fail_run(run, idx).await;
                return;
            }
        }
    }

    /// Run `indices` concurrently and wait for all of them. Returns the first
    /// step (in completion order) that failed.
    async fn run_wave(&self, run: &mut WorkflowRun, indices: &[usize]) -> Option<usize> {
        let mut launched = Vec::with_capacity(indices.len());
        for &idx in indices {
            run.steps[idx].status = StepStatus::InProgress;
            let input = self.dependency_input(run, idx);
            launched.push((idx, run.steps[idx].clone(), input));
        }
        self.publish(run);

        let run_id = run.id.clone();
        let mut pending: FuturesUnordered<_> = launched
            .into_iter()
            .map(|(idx, step, input)| {
                let run_id = run_id.as_str();
                async move { (idx, self.run_step(run_id, step, input).await) }
            })
            .collect();

        let mut first_failure = None;
        while let Some((idx, step)) = pending.next().await {
            if step.status == StepStatus::Failed {
                first_failure.get_or_insert(idx);
            } else {
                run.completion_order.push(idx);
            }
            run.steps[idx] = step;
        }
        self.publish(run);
        first_failure
    }

    /// Execute one step with retries, backoff and a per-attempt timeout.
    async fn run_step(
        &self,
        run_id: &str,
        mut step: WorkflowStep,
        previous: Option<Value>,
    ) -> WorkflowStep {
        step.status = StepStatus::InProgress;
        step.started_at = Some(Utc::now());
        let payload = build_payload(&step.definition, previous.as_ref());
        let max_attempts = step.definition.max_attempts();
        let timeout = step.definition.timeout();

        let mut last: Option<CallFailure> = None;
        for attempt in 1..=max_attempts {
            step.attempts = attempt;
            debug!(workflow_id = %run_id, step_id = %step.id(), attempt, "Running step");

            match call_step(
                self.executor.as_ref(),
                &step.definition.agent_type,
                payload.clone(),
                timeout,
            )
            .await
            {
                Ok(data) => {
                    step.status = StepStatus::Completed;
                    step.result = Some(data);
                    step.error = None;
                    step.error_kind = None;
                    step.completed_at = Some(Utc::now());
                    info!(workflow_id = %run_id, step_id = %step.id(), attempt, "Step completed");
                    return step;
                }
                Err(failure) => {
                    if !failure.kind.is_retryable() {
                        warn!(
                            workflow_id = %run_id,
                            step_id = %step.id(),
                            error = %failure.message,
                            "Step failed permanently"
                        );
                        step.status = StepStatus::Failed;
                        step.error = Some(failure.message);
                        step.error_kind = Some(failure.kind);
                        step.completed_at = Some(Utc::now());
                        return step;
                    }
                    if attempt < max_attempts {
                        let delay = self.config.backoff_unit() * 2u32.saturating_pow(attempt - 1);
                        warn!(
                            workflow_id = %run_id,
                            step_id = %step.id(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %failure.message,
                            "Step attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last = Some(failure);
                }
            }
        }

        let last_error = last.map(|f| f.message).unwrap_or_default();
        let err = SwitchyardError::StepRetriesExhausted {
            step_id: step.id().to_string(),
            attempts: step.attempts,
            last_error,
        };
        warn!(workflow_id = %run_id, step_id = %step.id(), error = %err, "Step failed");
        step.status = StepStatus::Failed;
        step.error = Some(err.to_string());
        step.error_kind = Some(err.kind());
        step.completed_at = Some(Utc::now());
        step
    }

    /// Undo completed steps in reverse completion order, invoking their
    /// compensation where one is declared.
    async fn roll_back(&self, run: &mut WorkflowRun) {
        let order: Vec<usize> = run.completion_order.iter().rev().copied().collect();
        for idx in order {
            let step = &mut run.steps[idx];
            if step.status != StepStatus::Completed || !step.definition.rollback {
                continue;
            }

            if let Some(compensation) = step.definition.compensation.clone() {
                let mut payload = match compensation.task_data {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                payload.insert(
                    "originalResult".to_string(),
                    step.result.clone().unwrap_or(Value::Null),
                );
                let timeout = step.definition.timeout();
                match call_step(
                    self.executor.as_ref(),
                    &compensation.agent_type,
                    Value::Object(payload),
                    timeout,
                )
                .await
                {
                    Ok(_) => info!(workflow_id = %run.id, step_id = %step.id(), "Step compensated"),
                    Err(failure) => {
                        warn!(
                            workflow_id = %run.id,
                            step_id = %step.id(),
                            error = %failure.message,
                            "Compensation failed"
                        );
                        step.compensation_error = Some(failure.message);
                    }
                }
            }
            step.status = StepStatus::RolledBack;
        }
        info!(workflow_id = %run.id, "Completed steps rolled back");
    }

    async fn fail_run(&self, run: &mut WorkflowRun, failed_idx: usize) {
        let step = &run.steps[failed_idx];
        run.status = WorkflowStatus::Failed;
        run.error = Some(format!("step '{}' failed: {}", step.id(), step_error(step)));
        run.error_kind = step.error_kind;
        if run.rollback_on_failure {
            self.roll_back(run).await;
        }
    }

    fn mark_cancelled(&self, run: &mut WorkflowRun) {
        let err = SwitchyardError::WorkflowAborted("cancelled".into());
        run.status = WorkflowStatus::Cancelled;
        run.error = Some(err.to_string());
        run.error_kind = Some(err.kind());
        info!(workflow_id = %run.id, "Workflow cancelled");
    }

    /// Evaluate the step's guard; a false guard marks it `Skipped`.
    fn guard_allows(&self, run: &mut WorkflowRun, idx: usize) -> bool {
        let Some(condition) = run.steps[idx].definition.condition.as_ref() else {
            return true;
        };
        let target = run.step(&condition.step_id).and_then(|s| s.result.as_ref());
        if condition.holds(target) {
            return true;
        }
        let step = &mut run.steps[idx];
        step.status = StepStatus::Skipped;
        info!(workflow_id = %run.id, step_id = %step.id(), "Guard false, step skipped");
        false
    }

    /// Hybrid steps consume their first dependency's output.
    fn dependency_input(&self, run: &WorkflowRun, idx: usize) -> Option<Value> {
        let def = &run.steps[idx].definition;
        if !def.use_previous_output {
            return None;
        }
        let first = def.depends_on.first()?;
        run.index_of(first)
            .and_then(|dep| run.steps[dep].result.clone())
    }

    fn publish(&self, run: &WorkflowRun) {
        if let Some(active) = self.active.write().get_mut(&run.id) {
            active.snapshot = run.clone();
        }
    }
}

#[async_trait]
impl WorkflowDelegate for WorkflowEngine {
    async fn run_workflow(&self, definition: Value) -> CoordinationResult {
        let outcome = match self.execute_json(definition).await {
            Ok(outcome) => outcome,
            Err(e) => return CoordinationResult::from_error("workflow", &e),
        };
        let data = match serde_json::to_value(&outcome) {
            Ok(data) => data,
            Err(e) => return CoordinationResult::from_error("workflow", &SwitchyardError::from(e)),
        };
        let status = match outcome.status {
            WorkflowStatus::Completed => CoordinationStatus::Success,
            WorkflowStatus::PartialSuccess => CoordinationStatus::Partial,
            _ => CoordinationStatus::Error,
        };
        let mut result = CoordinationResult::success("workflow", data);
        result.status = status;
        if status == CoordinationStatus::Error {
            result.error = Some(
                outcome
                    .error
                    .unwrap_or_else(|| format!("workflow finished {}", outcome.status)),
            );
            result.error_kind = Some(outcome.error_kind.unwrap_or(ErrorKind::WorkflowAborted));
        }
        result
    }
}

/// Static task data, plus the previous output's keys where not already set,
/// plus the previous output itself under `previousOutput`.
fn build_payload(definition: &StepDefinition, previous: Option<&Value>) -> Value {
    let mut payload = match &definition.task_data {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Some(previous) = previous {
        if let Value::Object(fields) = previous {
            for (key, value) in fields {
                payload.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        payload.insert("previousOutput".to_string(), previous.clone());
    }
    Value::Object(payload)
}

fn step_error(step: &WorkflowStep) -> &str {
    step.error.as_deref().unwrap_or("unknown error")
}
