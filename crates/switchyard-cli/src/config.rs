use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use switchyard_core::{
    CoordinatorConfig, HealthConfig, RecoveryConfig, SwitchyardError, SwitchyardResult,
    WorkerDescriptor, WorkflowConfig,
};
use tracing::warn;

/// Contents of `switchyard.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub workers: Vec<WorkerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, alias = "apiKeys")]
    pub api_keys: Vec<String>,
    /// Timeout for remediation commands.
    #[serde(default = "default_command_timeout", alias = "commandTimeoutSeconds")]
    pub command_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_keys: vec![],
            command_timeout_seconds: default_command_timeout(),
        }
    }
}

/// One `[[workers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerEntry {
    #[serde(alias = "workerId")]
    pub worker_id: String,
    pub category: String,
    pub endpoint: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, alias = "restartCommand")]
    pub restart_command: Option<String>,
    #[serde(default, alias = "resetCommand")]
    pub reset_command: Option<String>,
    #[serde(default, alias = "fallbackCommand")]
    pub fallback_command: Option<String>,
}

impl WorkerEntry {
    pub fn descriptor(&self) -> WorkerDescriptor {
        WorkerDescriptor {
            worker_id: self.worker_id.clone(),
            category: self.category.clone(),
            endpoint: self.endpoint.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_command_timeout() -> u64 {
    60
}

impl SwitchyardConfig {
    /// Read and parse `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> SwitchyardResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(SwitchyardError::Config(format!(
                "failed to read '{}': {e}",
                path.display()
            ))),
        }
    }

    pub fn parse(raw: &str) -> SwitchyardResult<Self> {
        toml::from_str(raw).map_err(|e| SwitchyardError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SwitchyardResult<()> {
        self.health.validate()?;
        self.recovery.validate()?;
        self.coordinator.validate()?;

        let mut ids = HashSet::new();
        for worker in &self.workers {
            if worker.worker_id.trim().is_empty() {
                return Err(SwitchyardError::Config("worker with empty worker_id".into()));
            }
            if !ids.insert(worker.worker_id.as_str()) {
                return Err(SwitchyardError::Config(format!(
                    "duplicate worker_id '{}'",
                    worker.worker_id
                )));
            }
            let scheme_ok = worker.endpoint.starts_with("http://")
                || worker.endpoint.starts_with("https://");
            if !scheme_ok {
                return Err(SwitchyardError::Config(format!(
                    "worker '{}': endpoint must be an http(s) URL",
                    worker.worker_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
port = 8080
api_keys = ["k1"]

[health]
heartbeat_interval_seconds = 10

[health.circuit_breaker]
failure_threshold = 3

[recovery]
max_recovery_attempts = 2
recovery_backoff_seconds = [1, 2]

[workflow]
backoff_unit_ms = 250

[[workers]]
worker_id = "sports-1"
category = "sports"
endpoint = "http://localhost:8101"
restart_command = "systemctl restart sports-worker"

[[workers]]
workerId = "writer-1"
category = "writer"
endpoint = "http://localhost:8103"
metadata = { region = "eu" }
"#;

    #[test]
    fn test_parse_sample() {
        let config = SwitchyardConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.health.heartbeat_interval_seconds, 10);
        assert_eq!(config.health.heartbeat_timeout_seconds, 120);
        assert_eq!(config.health.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.recovery.max_recovery_attempts, 2);
        assert_eq!(config.workflow.backoff_unit_ms, 250);
        assert_eq!(config.workers.len(), 2);
        assert_eq!(
            config.workers[0].restart_command.as_deref(),
            Some("systemctl restart sports-worker")
        );
        assert_eq!(config.workers[1].descriptor().metadata["region"], "eu");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = SwitchyardConfig::parse(include_str!("../../../switchyard.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.workers.len(), 5);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SwitchyardConfig::parse("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.recovery.recovery_backoff_seconds, vec![5, 15, 30]);
        assert!(config.workers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_duplicate_workers_and_bad_endpoints() {
        let dup = SwitchyardConfig::parse(
            r#"
[[workers]]
worker_id = "a"
category = "sports"
endpoint = "http://x"
[[workers]]
worker_id = "a"
category = "sports"
endpoint = "http://y"
"#,
        )
        .unwrap();
        assert!(dup.validate().unwrap_err().to_string().contains("duplicate"));

        let bad = SwitchyardConfig::parse(
            r#"
[[workers]]
worker_id = "a"
category = "sports"
endpoint = "localhost:8101"
"#,
        )
        .unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = SwitchyardConfig::load(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_malformed_toml() {
        let err = SwitchyardConfig::parse("[server\nport = 1").unwrap_err();
        assert!(matches!(err, SwitchyardError::Config(_)));
    }
}
