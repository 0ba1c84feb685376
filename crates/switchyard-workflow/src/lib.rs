//! Workflow engine for the Switchyard orchestrator.
//!
//! Executes declarative multi-step plans by invoking a [`StepExecutor`]
//! (normally the [`Coordinator`](switchyard_coordinator::Coordinator)) once
//! per step, in sequential, parallel or dependency-graph order, with
//! per-step retries, timeouts, guard conditions and compensating rollback.
//!
//! # Main types
//!
//! - [`WorkflowEngine`]: Runs workflows and keeps the active/completed run maps.
//! - [`WorkflowDefinition`]: The JSON plan submitted by callers.
//! - [`WorkflowRun`]: A run with its steps' runtime state.
//! - [`WorkflowOutcome`]: What a caller gets back once a run terminates.
//! - [`StepExecutor`]: The seam between the engine and whatever runs a step.

/// Workflow definitions and validation.
pub mod definition;
/// Engine and execution modes.
pub mod engine;
/// Step executor trait.
pub mod executor;
/// Dependency graph helpers.
pub mod graph;
/// Runtime state of runs and steps.
pub mod types;

pub use definition::{Compensation, StepCondition, StepDefinition, WorkflowDefinition, WorkflowType};
pub use engine::WorkflowEngine;
pub use executor::StepExecutor;
pub use types::{StepReport, StepStatus, WorkflowOutcome, WorkflowRun, WorkflowStatus, WorkflowStep};
