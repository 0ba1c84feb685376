//! HTTP gateway for the Switchyard orchestrator.
//!
//! Exposes coordination, workflow execution and worker health/recovery over
//! an axum router, with optional API-key authentication.

/// Route handlers.
pub mod api;
/// API-key auth middleware.
pub mod middleware;
/// Router construction and serving.
pub mod server;

pub use middleware::AuthConfig;
pub use server::{AppState, GatewayServer};
