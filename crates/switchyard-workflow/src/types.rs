use crate::definition::{StepDefinition, WorkflowDefinition, WorkflowType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_core::ErrorKind;
use uuid::Uuid;

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// An attempt is running.
    InProgress,
    /// Finished with a result.
    Completed,
    /// Out of attempts, or abandoned.
    Failed,
    /// Guard condition evaluated false.
    Skipped,
    /// Compensated during rollback.
    RolledBack,
}

impl StepStatus {
    /// No further transitions except rollback.
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::InProgress)
    }

    /// Satisfies a dependency in hybrid mode.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

/// Lifecycle of a whole workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Accepted, not started.
    Created,
    /// Steps are executing.
    Running,
    /// Every step completed or was skipped.
    Completed,
    /// Parallel mode: some steps succeeded, some failed.
    PartialSuccess,
    /// A step failed.
    Failed,
    /// Stopped by a caller, or abandoned mid-run.
    Cancelled,
    /// Completed steps were compensated.
    RolledBack,
}

impl WorkflowStatus {
    /// True for every state after `Running`.
    pub fn is_finished(self) -> bool {
        !matches!(self, WorkflowStatus::Created | WorkflowStatus::Running)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Created => "created",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::PartialSuccess => "partial_success",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// A step plus its runtime state. Only the task executing it mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Step as declared.
    #[serde(flatten)]
    pub definition: StepDefinition,
    /// Current status.
    pub status: StepStatus,
    /// Result of the successful attempt.
    pub result: Option<Value>,
    /// Last error message.
    pub error: Option<String>,
    /// Last error code.
    pub error_kind: Option<ErrorKind>,
    /// Attempts made so far.
    pub attempts: u32,
    /// When the first attempt began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the compensating call during rollback failed.
    pub compensation_error: Option<String>,
}

impl WorkflowStep {
    /// Pending step.
    pub fn new(definition: StepDefinition) -> Self {
        Self {
            definition,
            status: StepStatus::Pending,
            result: None,
            error: None,
            error_kind: None,
            attempts: 0,
            started_at: None,
            completed_at: None,
            compensation_error: None,
        }
    }

    /// Step id.
    pub fn id(&self) -> &str {
        &self.definition.step_id
    }

    /// Completed now or before a rollback.
    pub fn succeeded(&self) -> bool {
        matches!(self.status, StepStatus::Completed | StepStatus::RolledBack)
    }
}

/// A workflow execution. Owned by the engine; everyone else gets clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    /// Run id (UUID v4).
    pub id: String,
    /// Workflow name from the definition.
    pub name: String,
    /// Execution mode.
    pub workflow_type: WorkflowType,
    /// Whether failure triggers rollback.
    pub rollback_on_failure: bool,
    /// Steps with their runtime state.
    pub steps: Vec<WorkflowStep>,
    /// Current status.
    pub status: WorkflowStatus,
    /// Why the run failed or stopped.
    pub error: Option<String>,
    /// Error code matching `error`.
    pub error_kind: Option<ErrorKind>,
    /// When the run was accepted.
    pub created_at: DateTime<Utc>,
    /// When execution began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall time from start to finish.
    pub execution_time_seconds: Option<f64>,
    /// Step indices in the order they completed.
    #[serde(skip)]
    pub(crate) completion_order: Vec<usize>,
}

impl WorkflowRun {
    /// New run in `Created` with pending steps.
    pub fn new(definition: WorkflowDefinition) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: definition.workflow_name,
            workflow_type: definition.workflow_type,
            rollback_on_failure: definition.rollback_on_failure,
            steps: definition.steps.into_iter().map(WorkflowStep::new).collect(),
            status: WorkflowStatus::Created,
            error: None,
            error_kind: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            execution_time_seconds: None,
            completion_order: Vec::new(),
        }
    }

    /// Step by id.
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id() == step_id)
    }

    pub(crate) fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id() == step_id)
    }

    /// Ids of steps that completed, including rolled-back ones.
    pub fn successes(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.succeeded())
            .map(|s| s.id().to_string())
            .collect()
    }

    /// Ids of failed steps.
    pub fn failures(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| s.id().to_string())
            .collect()
    }
}

/// Per-step entry of a [`WorkflowOutcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// Step id.
    pub step_id: String,
    /// Display name.
    pub name: String,
    /// Task kind.
    pub agent_type: String,
    /// Final status.
    pub status: StepStatus,
    /// Result, when the step completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Last error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Attempts made.
    pub attempts: u32,
    /// Why compensation failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_error: Option<String>,
}

impl From<&WorkflowStep> for StepReport {
    fn from(step: &WorkflowStep) -> Self {
        Self {
            step_id: step.id().to_string(),
            name: step.definition.display_name().to_string(),
            agent_type: step.definition.agent_type.clone(),
            status: step.status,
            result: step.result.clone(),
            error: step.error.clone(),
            error_kind: step.error_kind,
            attempts: step.attempts,
            compensation_error: step.compensation_error.clone(),
        }
    }
}

/// What a caller gets back from running a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutcome {
    /// Run id.
    pub workflow_id: String,
    /// Workflow name.
    pub workflow_name: String,
    /// Final status.
    pub status: WorkflowStatus,
    /// Per-step reports in declaration order.
    pub results: Vec<StepReport>,
    /// Ids of steps that completed.
    pub successes: Vec<String>,
    /// Ids of steps that failed.
    pub failures: Vec<String>,
    /// Why the run failed or stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error code matching `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Wall time in seconds.
    pub execution_time_seconds: f64,
}

impl From<&WorkflowRun> for WorkflowOutcome {
    fn from(run: &WorkflowRun) -> Self {
        Self {
            workflow_id: run.id.clone(),
            workflow_name: run.name.clone(),
            status: run.status,
            results: run.steps.iter().map(StepReport::from).collect(),
            successes: run.successes(),
            failures: run.failures(),
            error: run.error.clone(),
            error_kind: run.error_kind,
            execution_time_seconds: run.execution_time_seconds.unwrap_or_default(),
        }
    }
}

impl WorkflowOutcome {
    /// Report for one step.
    pub fn step(&self, step_id: &str) -> Option<&StepReport> {
        self.results.iter().find(|r| r.step_id == step_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(WorkflowStatus::PartialSuccess).unwrap(),
            json!("partial_success")
        );
        assert_eq!(
            serde_json::to_value(StepStatus::RolledBack).unwrap(),
            json!("rolled_back")
        );
        assert_eq!(WorkflowStatus::RolledBack.to_string(), "rolled_back");
    }

    #[test]
    fn test_dependency_satisfaction() {
        assert!(StepStatus::Completed.satisfies_dependency());
        assert!(StepStatus::Skipped.satisfies_dependency());
        assert!(!StepStatus::Failed.satisfies_dependency());
        assert!(!StepStatus::RolledBack.satisfies_dependency());
        assert!(!StepStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_outcome_counts_rolled_back_as_success() {
        let def = WorkflowDefinition::new(
            "w",
            WorkflowType::Parallel,
            vec![
                StepDefinition::new("a", "sports", json!({})),
                StepDefinition::new("b", "sports", json!({})),
            ],
        );
        let mut run = WorkflowRun::new(def);
        run.steps[0].status = StepStatus::RolledBack;
        run.steps[1].status = StepStatus::Failed;
        let outcome = WorkflowOutcome::from(&run);
        assert_eq!(outcome.successes, vec!["a".to_string()]);
        assert_eq!(outcome.failures, vec!["b".to_string()]);

        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("workflowId").is_some());
        assert!(json.get("executionTimeSeconds").is_some());
        assert!(json.get("error").is_none());
    }
}
