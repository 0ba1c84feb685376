//! `switchyard` binary: serves the gateway or runs one-off tasks and workflows.

mod config;
mod remediator;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use config::SwitchyardConfig;
use remediator::CommandRemediator;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchyard_coordinator::Coordinator;
use switchyard_core::CoordinationStatus;
use switchyard_gateway::{AppState, AuthConfig, GatewayServer};
use switchyard_health::{AutoRecovery, HealthMonitor};
use switchyard_workflow::{WorkflowEngine, WorkflowStatus};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "switchyard",
    version,
    about = "Switchyard: task routing, worker health and workflows"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Start health monitoring, auto recovery and the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one workflow definition and print its outcome
    Run {
        /// Workflow definition (JSON)
        workflow: PathBuf,
    },
    /// Route one task and print the coordination result
    Coordinate {
        /// Task type (sports, research, writer, reviewer, crypto, utility, workflow)
        task_type: String,
        /// Task payload as JSON
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Validate the config file and print a summary
    CheckConfig,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Construct the process's components and register the configured workers.
async fn build_state(config: &SwitchyardConfig) -> anyhow::Result<Arc<AppState>> {
    let monitor = Arc::new(HealthMonitor::with_http_probe(config.health.clone())?);
    let coordinator = Arc::new(
        Coordinator::with_http(config.coordinator.clone())?.with_monitor(monitor.clone()),
    );
    for worker in &config.workers {
        coordinator.register_worker(worker.descriptor()).await;
    }
    let workflows = WorkflowEngine::attach(coordinator.clone(), config.workflow.clone());
    let remediator = CommandRemediator::new(
        &config.workers,
        Duration::from_secs(config.server.command_timeout_seconds),
    );
    let recovery = Arc::new(AutoRecovery::new(
        config.recovery.clone(),
        monitor.clone(),
        Arc::new(remediator),
    ));
    info!(workers = config.workers.len(), "Components initialised");

    Ok(Arc::new(AppState {
        coordinator,
        workflows,
        monitor,
        recovery,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    info!("Shutdown signal received");
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // a missing .env is fine
    let _ = dotenvy::dotenv();
    init_tracing(cli.log_format);

    let config = SwitchyardConfig::load(&cli.config)?;
    config
        .validate()
        .with_context(|| format!("invalid config '{}'", cli.config.display()))?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid listen address {host}:{port}"))?;

            let state = build_state(&config).await?;
            let auth = AuthConfig::new(config.server.api_keys.clone());
            if auth.is_enabled() {
                info!(keys = auth.key_count(), "API key auth enabled");
            }

            state.monitor.start();
            state.recovery.start();

            let served = GatewayServer::serve(state.clone(), auth, addr, shutdown_signal()).await;

            state.recovery.stop().await;
            state.monitor.stop().await;
            served?;
        }
        Commands::Run { workflow } => {
            let raw = tokio::fs::read_to_string(&workflow)
                .await
                .with_context(|| format!("failed to read workflow '{}'", workflow.display()))?;
            let definition: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("'{}' is not valid JSON", workflow.display()))?;

            let state = build_state(&config).await?;
            let outcome = state.workflows.execute_json(definition).await?;
            print_json(&outcome)?;
            if outcome.status != WorkflowStatus::Completed {
                anyhow::bail!("workflow finished with status {}", outcome.status);
            }
        }
        Commands::Coordinate { task_type, payload } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("--payload is not valid JSON")?;

            let state = build_state(&config).await?;
            let result = state.coordinator.coordinate(&task_type, payload).await;
            print_json(&result)?;
            if result.status == CoordinationStatus::Error {
                anyhow::bail!("{}", result.error_message());
            }
        }
        Commands::CheckConfig => {
            println!("Config OK: {}", cli.config.display());
            println!("  server: {}:{}", config.server.host, config.server.port);
            println!(
                "  health: check every {}s, circuit opens after {} failures",
                config.health.heartbeat_interval_seconds,
                config.health.circuit_breaker.failure_threshold
            );
            println!(
                "  recovery: {} (max {} attempts, backoff {:?}s)",
                if config.recovery.enabled { "enabled" } else { "disabled" },
                config.recovery.max_recovery_attempts,
                config.recovery.recovery_backoff_seconds
            );
            println!("  workers:");
            for worker in &config.workers {
                println!("    {} [{}] {}", worker.worker_id, worker.category, worker.endpoint);
            }
            println!("Total: {} worker(s)", config.workers.len());
        }
    }

    Ok(())
}
