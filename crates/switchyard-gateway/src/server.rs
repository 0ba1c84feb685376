use crate::api;
use crate::middleware::{auth_middleware, AuthConfig};
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use switchyard_coordinator::Coordinator;
use switchyard_core::{SwitchyardError, SwitchyardResult};
use switchyard_health::{AutoRecovery, HealthMonitor};
use switchyard_workflow::WorkflowEngine;
use tokio::net::TcpListener;
use tracing::info;

/// Shared application state: the process's component instances.
pub struct AppState {
    /// Task router.
    pub coordinator: Arc<Coordinator>,
    /// Workflow runner.
    pub workflows: Arc<WorkflowEngine>,
    /// Worker health tracking.
    pub monitor: Arc<HealthMonitor>,
    /// Automatic remediation.
    pub recovery: Arc<AutoRecovery>,
}

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router, with API-key auth when `auth` lists any keys.
    pub fn build(state: Arc<AppState>, auth: AuthConfig) -> Router {
        let app = Router::new()
            .route("/health", get(api::health))
            .route("/api/coordinate/{task_type}", post(api::coordinate))
            .route("/api/workflows", get(api::list_workflows).post(api::submit_workflow))
            .route("/api/workflows/{id}", get(api::get_workflow))
            .route("/api/workflows/{id}/cancel", post(api::cancel_workflow))
            .route("/api/workflows/{id}/rollback", post(api::rollback_workflow))
            .route("/api/workers/health", get(api::all_health))
            .route("/api/workers/unhealthy", get(api::unhealthy))
            .route("/api/workers/{id}/health", get(api::worker_health))
            .route(
                "/api/workers/{id}/recovery",
                get(api::worker_recovery).post(api::recover_worker),
            )
            .route("/api/workers/{id}/recovery/reset", post(api::reset_recovery))
            .route("/api/stats", get(api::stats))
            .with_state(state);

        if auth.is_enabled() {
            app.layer(axum_mw::from_fn_with_state(Arc::new(auth), auth_middleware))
        } else {
            app
        }
    }

    /// Bind `addr` and serve until `shutdown` resolves.
    pub async fn serve(
        state: Arc<AppState>,
        auth: AuthConfig,
        addr: SocketAddr,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> SwitchyardResult<()> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(addr = %local, auth = auth.is_enabled(), "Gateway listening");

        axum::serve(listener, Self::build(state, auth))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| SwitchyardError::Http(format!("gateway server failed: {e}")))?;
        info!("Gateway stopped");
        Ok(())
    }
}
