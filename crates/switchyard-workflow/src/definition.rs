use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use switchyard_core::{SwitchyardError, SwitchyardResult};

/// Execution mode of a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    /// One step at a time; the first failure stops the run.
    #[default]
    Sequential,
    /// All steps at once.
    Parallel,
    /// Dependency-graph execution in waves.
    Hybrid,
}

/// A declarative workflow as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Name used in logs and outcomes.
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,
    /// Execution mode.
    #[serde(default)]
    pub workflow_type: WorkflowType,
    /// Compensate completed steps when the run fails.
    #[serde(default)]
    pub rollback_on_failure: bool,
    /// Steps in declaration order.
    pub steps: Vec<StepDefinition>,
}

/// Guard evaluated against an earlier step's result; false skips the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCondition {
    /// Step whose result is inspected.
    pub step_id: String,
    /// Top-level key or JSON pointer (`/a/b`) into the result. Absent compares the whole result.
    #[serde(default)]
    pub field: Option<String>,
    /// Value the selected result must equal.
    pub equals: Value,
}

impl StepCondition {
    /// Evaluate against the referenced step's result; no result never holds.
    pub fn holds(&self, result: Option<&Value>) -> bool {
        let Some(result) = result else {
            return false;
        };
        let actual = match self.field.as_deref() {
            None => Some(result),
            Some(ptr) if ptr.starts_with('/') => result.pointer(ptr),
            Some(key) => result.get(key),
        };
        actual == Some(&self.equals)
    }
}

/// Compensating call made for a completed step when the workflow rolls back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compensation {
    /// Task kind to run.
    pub agent_type: String,
    /// Payload for the compensating task.
    #[serde(default)]
    pub task_data: Value,
}

/// One step of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique id within the workflow.
    pub step_id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Task kind routed through the coordinator.
    pub agent_type: String,
    /// Payload; object fields are passed through to the task.
    #[serde(default)]
    pub task_data: Value,
    /// Steps that must finish first (hybrid mode).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Feed an earlier step's result in as `previousOutput`.
    #[serde(default)]
    pub use_previous_output: bool,
    /// Total attempts; zero still runs once.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Whether this step takes part in a rollback.
    #[serde(default = "default_true")]
    pub rollback: bool,
    /// Guard deciding whether the step runs.
    #[serde(default)]
    pub condition: Option<StepCondition>,
    /// Call made for this step during rollback.
    #[serde(default)]
    pub compensation: Option<Compensation>,
}

fn default_workflow_name() -> String {
    "unnamed-workflow".to_string()
}
fn default_retry_count() -> u32 {
    3
}
/// Longest per-attempt timeout a step may ask for (one day).
pub const MAX_STEP_TIMEOUT_SECONDS: f64 = 86_400.0;

fn default_timeout_seconds() -> f64 {
    300.0
}
fn default_true() -> bool {
    true
}

impl StepDefinition {
    /// Step with default retries and timeout.
    pub fn new(
        step_id: impl Into<String>,
        agent_type: impl Into<String>,
        task_data: Value,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            name: None,
            agent_type: agent_type.into(),
            task_data,
            depends_on: Vec::new(),
            use_previous_output: false,
            retry_count: default_retry_count(),
            timeout_seconds: default_timeout_seconds(),
            rollback: true,
            condition: None,
            compensation: None,
        }
    }

    /// Set the dependencies.
    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| (*d).to_string()).collect();
        self
    }

    /// Set the total attempt count.
    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Set the per-attempt timeout in seconds.
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Receive the previous step's result.
    pub fn using_previous_output(mut self) -> Self {
        self.use_previous_output = true;
        self
    }

    /// Only run when `condition` holds.
    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Compensate with `agent_type` on rollback.
    pub fn with_compensation(mut self, agent_type: impl Into<String>, task_data: Value) -> Self {
        self.compensation = Some(Compensation {
            agent_type: agent_type.into(),
            task_data,
        });
        self
    }

    /// Display name, defaulting to the step id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.step_id)
    }

    /// Total attempts, at least one.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.max(1)
    }

    /// Per-attempt timeout, clamped to [`MAX_STEP_TIMEOUT_SECONDS`].
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds.min(MAX_STEP_TIMEOUT_SECONDS))
            .unwrap_or(Duration::from_secs_f64(MAX_STEP_TIMEOUT_SECONDS))
    }
}

impl WorkflowDefinition {
    /// Definition without rollback.
    pub fn new(
        name: impl Into<String>,
        workflow_type: WorkflowType,
        steps: Vec<StepDefinition>,
    ) -> Self {
        Self {
            workflow_name: name.into(),
            workflow_type,
            rollback_on_failure: false,
            steps,
        }
    }

    /// Roll back completed steps on failure.
    pub fn with_rollback(mut self) -> Self {
        self.rollback_on_failure = true;
        self
    }

    /// Parse from a JSON value; shape errors become `InvalidWorkflow`.
    pub fn from_value(value: Value) -> SwitchyardResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| SwitchyardError::InvalidWorkflow(format!("malformed definition: {e}")))
    }

    /// Parse from JSON text.
    pub fn from_json(s: &str) -> SwitchyardResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| SwitchyardError::InvalidWorkflow(format!("malformed definition: {e}")))
    }

    /// Structural checks. Dependency cycles are left to the engine, which
    /// reports them as `CircularDependency` when no step can become ready.
    pub fn validate(&self) -> SwitchyardResult<()> {
        if self.steps.is_empty() {
            return Err(invalid("workflow has no steps"));
        }

        let mut ids = HashSet::new();
        for step in &self.steps {
            if step.step_id.trim().is_empty() {
                return Err(invalid("step with empty stepId"));
            }
            if step.agent_type.trim().is_empty() {
                return Err(invalid(format!("step '{}' has no agentType", step.step_id)));
            }
            if !ids.insert(step.step_id.as_str()) {
                return Err(invalid(format!("duplicate stepId '{}'", step.step_id)));
            }
            if !(step.task_data.is_object() || step.task_data.is_null()) {
                return Err(invalid(format!(
                    "step '{}': taskData must be an object",
                    step.step_id
                )));
            }
            if !step.timeout_seconds.is_finite() || step.timeout_seconds <= 0.0 {
                return Err(invalid(format!(
                    "step '{}': timeoutSeconds must be positive",
                    step.step_id
                )));
            }
            if step.timeout_seconds > MAX_STEP_TIMEOUT_SECONDS {
                return Err(invalid(format!(
                    "step '{}': timeoutSeconds must not exceed {MAX_STEP_TIMEOUT_SECONDS}",
                    step.step_id
                )));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(invalid(format!(
                        "step '{}' depends on unknown step '{dep}'",
                        step.step_id
                    )));
                }
            }
            if let Some(condition) = &step.condition {
                if self.workflow_type == WorkflowType::Parallel {
                    return Err(invalid(format!(
                        "step '{}': conditions are not supported in parallel workflows",
                        step.step_id
                    )));
                }
                if !ids.contains(condition.step_id.as_str()) {
                    return Err(invalid(format!(
                        "step '{}' has a condition on unknown step '{}'",
                        step.step_id, condition.step_id
                    )));
                }
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> SwitchyardError {
    SwitchyardError::InvalidWorkflow(msg.into())
}
