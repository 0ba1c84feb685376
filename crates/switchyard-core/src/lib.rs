//! Core types and error definitions for the Switchyard orchestrator.
//!
//! This crate provides the foundational types shared across all Switchyard
//! crates: the error taxonomy, the structured coordination result, worker
//! descriptors and configuration.
//!
//! # Main types
//!
//! - [`SwitchyardError`]: Unified error enum for all Switchyard components.
//! - [`SwitchyardResult`]: Convenience alias for `Result<T, SwitchyardError>`.
//! - [`ErrorKind`]: Serialisable error code, split into retryable and permanent.
//! - [`CoordinationResult`]: The success/partial/error outcome of one routed task.
//! - [`WorkerDescriptor`]: Identity, category and endpoint of a worker service.
//! - [`HealthConfig`], [`RecoveryConfig`], [`CoordinatorConfig`], [`WorkflowConfig`]:
//!   Component settings.

/// Component configuration with documented defaults.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Coordination result types.
pub mod result;
/// Worker descriptors.
pub mod worker;

pub use config::{
    CircuitBreakerConfig, CoordinatorConfig, HealthConfig, HealthScoringConfig, RecoveryConfig,
    UtilityConfig, WorkflowConfig,
};
pub use error::{ErrorKind, SwitchyardError, SwitchyardResult};
pub use result::{CoordinationResult, CoordinationStatus, WorkerCallResult, WorkerCallStatus};
pub use worker::WorkerDescriptor;
