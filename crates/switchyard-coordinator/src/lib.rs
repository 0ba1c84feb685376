//! Task routing and worker fan-out for the Switchyard orchestrator.
//!
//! A [`Coordinator`] turns `(task_type, payload)` into a validated
//! [`TaskRequest`], calls every registered worker of the matching category
//! concurrently, and folds the settled calls into one
//! [`CoordinationResult`](switchyard_core::CoordinationResult).
//!
//! # Main types
//!
//! - [`Coordinator`]: Routing entry point, worker registry and per-kind counters.
//! - [`TaskKind`] / [`TaskRequest`]: The closed set of routable tasks.
//! - [`WorkerTransport`]: How workers are reached; [`HttpTransport`] posts JSON.
//! - [`WorkflowDelegate`]: Hook the workflow engine attaches for the `workflow` kind.
//! - [`UtilityClient`]: External API calls behind a [`RateLimiter`] and [`ResponseCache`].

/// TTL response cache.
pub mod cache;
/// Coordinator and result aggregation.
pub mod coordinator;
/// Token bucket rate limiter.
pub mod rate_limit;
/// Task kinds and request parsing.
pub mod task;
/// Worker transports.
pub mod transport;
/// External API client for the utility kind.
pub mod utility;

pub use cache::ResponseCache;
pub use coordinator::{Coordinator, CoordinatorStats, KindStats, WorkflowDelegate};
pub use rate_limit::RateLimiter;
pub use task::{TaskKind, TaskRequest, UtilityMethod, UtilityRequest};
pub use transport::{HttpTransport, WorkerTransport};
pub use utility::UtilityClient;
