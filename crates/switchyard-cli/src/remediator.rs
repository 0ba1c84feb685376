use crate::config::WorkerEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use switchyard_core::{SwitchyardError, SwitchyardResult};
use switchyard_health::{RecoveryOutcome, RecoveryStrategy, Remediator, WorkerHealth};
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
struct WorkerCommands {
    restart: Option<String>,
    reset: Option<String>,
    fallback: Option<String>,
}

/// Remediates workers by running the shell commands configured for them.
///
/// Commands run through `sh -c` with `SWITCHYARD_WORKER_ID` and
/// `SWITCHYARD_WORKER_ENDPOINT` set. A strategy with no command configured
/// needs an operator.
pub struct CommandRemediator {
    commands: HashMap<String, WorkerCommands>,
    timeout: Duration,
}

impl CommandRemediator {
    pub fn new(workers: &[WorkerEntry], timeout: Duration) -> Self {
        let commands = workers
            .iter()
            .map(|w| {
                (
                    w.worker_id.clone(),
                    WorkerCommands {
                        restart: w.restart_command.clone(),
                        reset: w.reset_command.clone(),
                        fallback: w.fallback_command.clone(),
                    },
                )
            })
            .collect();
        Self { commands, timeout }
    }

    async fn run(
        &self,
        strategy: RecoveryStrategy,
        worker: &WorkerHealth,
    ) -> SwitchyardResult<RecoveryOutcome> {
        let command = self.commands.get(&worker.worker_id).and_then(|c| match strategy {
            RecoveryStrategy::Restart => c.restart.as_deref(),
            RecoveryStrategy::Reset => c.reset.as_deref(),
            RecoveryStrategy::Fallback => c.fallback.as_deref(),
            RecoveryStrategy::Manual => None,
        });
        let Some(command) = command else {
            return Ok(RecoveryOutcome::ManualRequired);
        };

        info!(
            worker_id = %worker.worker_id,
            strategy = %strategy,
            command,
            "Running remediation command"
        );
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("SWITCHYARD_WORKER_ID", &worker.worker_id)
            .env("SWITCHYARD_WORKER_ENDPOINT", worker.endpoint.as_deref().unwrap_or(""))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    worker_id = %worker.worker_id,
                    strategy = %strategy,
                    "Remediation command timed out"
                );
                return Err(SwitchyardError::Internal(format!(
                    "{strategy} command timed out after {:?}",
                    self.timeout
                )));
            }
        };

        if output.status.success() {
            Ok(RecoveryOutcome::Success)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SwitchyardError::Internal(format!(
                "{strategy} command exited with {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl Remediator for CommandRemediator {
    async fn restart(&self, worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
        self.run(RecoveryStrategy::Restart, worker).await
    }

    async fn reset(&self, worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
        self.run(RecoveryStrategy::Reset, worker).await
    }

    async fn fallback(&self, worker: &WorkerHealth) -> SwitchyardResult<RecoveryOutcome> {
        self.run(RecoveryStrategy::Fallback, worker).await
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use switchyard_health::{CircuitState, WorkerStatus};

    fn entry(restart: Option<&str>, reset: Option<&str>) -> WorkerEntry {
        WorkerEntry {
            worker_id: "sports-1".into(),
            category: "sports".into(),
            endpoint: "http://localhost:8101".into(),
            metadata: HashMap::new(),
            restart_command: restart.map(str::to_string),
            reset_command: reset.map(str::to_string),
            fallback_command: None,
        }
    }

    fn health() -> WorkerHealth {
        WorkerHealth {
            worker_id: "sports-1".into(),
            category: Some("sports".into()),
            endpoint: Some("http://localhost:8101".into()),
            score: 5.0,
            status: WorkerStatus::Dead,
            circuit_state: CircuitState::Open,
            consecutive_failures: 9,
            heartbeat_successes: 0,
            heartbeat_failures: 3,
            success_count: 0,
            error_count: 9,
            timeout_count: 0,
            avg_latency_ms: None,
            p95_latency_ms: None,
            recovery_attempts: 1,
            recovering: true,
            last_heartbeat: None,
        }
    }

    #[tokio::test]
    async fn test_successful_command() {
        let remediator = CommandRemediator::new(
            &[entry(Some("test \"$SWITCHYARD_WORKER_ID\" = sports-1"), None)],
            Duration::from_secs(5),
        );
        let outcome = remediator.restart(&health()).await.unwrap();
        assert_eq!(outcome, RecoveryOutcome::Success);
    }

    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let remediator = CommandRemediator::new(
            &[entry(None, Some("echo no such unit >&2; exit 3"))],
            Duration::from_secs(5),
        );
        let err = remediator.reset(&health()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("no such unit"), "{message}");
    }

    #[tokio::test]
    async fn test_missing_command_needs_operator() {
        let remediator = CommandRemediator::new(&[entry(None, None)], Duration::from_secs(5));
        assert_eq!(
            remediator.fallback(&health()).await.unwrap(),
            RecoveryOutcome::ManualRequired
        );

        let unknown = CommandRemediator::new(&[], Duration::from_secs(5));
        assert_eq!(
            unknown.restart(&health()).await.unwrap(),
            RecoveryOutcome::ManualRequired
        );
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let remediator = CommandRemediator::new(
            &[entry(Some("sleep 5"), None)],
            Duration::from_millis(100),
        );
        let err = remediator.restart(&health()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
