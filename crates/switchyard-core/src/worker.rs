use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity and address of one worker service.
///
/// Created at registration time and never mutated afterwards; live health
/// state is owned by the health monitor, not by the descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// Unique worker id.
    #[serde(alias = "workerId")]
    pub worker_id: String,
    /// Task category this worker serves (`sports`, `research`, ...).
    pub category: String,
    /// Base URL, e.g. `http://localhost:8101`.
    pub endpoint: String,
    /// Free-form labels (region, version, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkerDescriptor {
    /// Descriptor without metadata.
    pub fn new(
        worker_id: impl Into<String>,
        category: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            category: category.into(),
            endpoint: endpoint.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Endpoint joined with a path, without doubling the slash.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join() {
        let w = WorkerDescriptor::new("r1", "research", "http://localhost:8102/");
        assert_eq!(w.url("/api/research"), "http://localhost:8102/api/research");
        assert_eq!(w.url("health"), "http://localhost:8102/health");
    }
}
