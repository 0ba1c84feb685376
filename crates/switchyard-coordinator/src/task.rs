use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use switchyard_core::{SwitchyardError, SwitchyardResult};

/// The closed set of task types the coordinator routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Routed to `sports` workers.
    Sports,
    /// Routed to `research` workers.
    Research,
    /// Routed to `writer` workers.
    Writer,
    /// Routed to every `reviewer` worker.
    Reviewer,
    /// Routed to `crypto` workers.
    Crypto,
    /// Handled in process by the utility client.
    Utility,
    /// Handed to the attached workflow engine.
    Workflow,
}

impl TaskKind {
    /// Every kind, in declaration order.
    pub const ALL: [TaskKind; 7] = [
        TaskKind::Sports,
        TaskKind::Research,
        TaskKind::Writer,
        TaskKind::Reviewer,
        TaskKind::Crypto,
        TaskKind::Utility,
        TaskKind::Workflow,
    ];

    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Sports => "sports",
            TaskKind::Research => "research",
            TaskKind::Writer => "writer",
            TaskKind::Reviewer => "reviewer",
            TaskKind::Crypto => "crypto",
            TaskKind::Utility => "utility",
            TaskKind::Workflow => "workflow",
        }
    }

    /// Worker endpoint verb (`POST /api/<verb>`) for kinds served by workers.
    pub fn verb(self) -> Option<&'static str> {
        match self {
            TaskKind::Sports | TaskKind::Crypto => Some("analyze"),
            TaskKind::Research => Some("research"),
            TaskKind::Writer => Some("write"),
            TaskKind::Reviewer => Some("review"),
            TaskKind::Utility | TaskKind::Workflow => None,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| SwitchyardError::UnknownTaskType(s.to_string()))
    }
}

/// HTTP method for utility calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UtilityMethod {
    /// Query-string request.
    Get,
    /// JSON body request.
    Post,
}

impl UtilityMethod {
    /// Method name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            UtilityMethod::Get => "GET",
            UtilityMethod::Post => "POST",
        }
    }
}

/// An outbound external API call made by the utility kind.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilityRequest {
    /// Key for rate limiting.
    pub api_id: String,
    /// Target URL.
    pub url: String,
    /// HTTP method.
    pub method: UtilityMethod,
    /// Query parameters (GET) or default body (POST).
    pub params: Map<String, Value>,
    /// Explicit POST body.
    pub body: Option<Value>,
    /// Whether GET responses may be served from cache.
    pub use_cache: bool,
}

/// A validated task. Parsing happens once, before any network call.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRequest {
    /// Match or odds analysis.
    Sports {
        /// What to analyse.
        query: String,
        /// Full payload, forwarded to the worker.
        payload: Map<String, Value>,
    },
    /// Background research on a topic.
    Research {
        /// Subject to research.
        topic: String,
        /// Full payload, forwarded to the worker.
        payload: Map<String, Value>,
    },
    /// Article drafting.
    Writer {
        /// Subject to write about.
        topic: String,
        /// Full payload, forwarded to the worker.
        payload: Map<String, Value>,
    },
    /// Content review, fanned out to every reviewer for a consensus.
    Reviewer {
        /// Text under review.
        content: String,
        /// Full payload, forwarded to the worker.
        payload: Map<String, Value>,
    },
    /// Price lookup for a crypto asset.
    Crypto {
        /// Ticker symbol.
        symbol: String,
        /// Full payload, forwarded to the worker.
        payload: Map<String, Value>,
    },
    /// External API call made directly by the coordinator.
    Utility(UtilityRequest),
    /// A workflow definition to run through the attached workflow engine.
    Workflow(Value),
}

impl TaskRequest {
    /// Validate `payload` for the given kind.
    pub fn parse(kind: TaskKind, payload: Value) -> SwitchyardResult<Self> {
        let Value::Object(payload) = payload else {
            return Err(SwitchyardError::InvalidPayload(format!(
                "{kind} payload must be a JSON object"
            )));
        };

        match kind {
            TaskKind::Sports => Ok(TaskRequest::Sports {
                query: required_str(&payload, kind, "query")?,
                payload,
            }),
            TaskKind::Research => Ok(TaskRequest::Research {
                topic: required_str(&payload, kind, "topic")?,
                payload,
            }),
            TaskKind::Writer => Ok(TaskRequest::Writer {
                topic: required_str(&payload, kind, "topic")?,
                payload,
            }),
            TaskKind::Reviewer => Ok(TaskRequest::Reviewer {
                content: required_str(&payload, kind, "content")?,
                payload,
            }),
            TaskKind::Crypto => Ok(TaskRequest::Crypto {
                symbol: required_str(&payload, kind, "symbol")?.to_ascii_uppercase(),
                payload,
            }),
            TaskKind::Utility => parse_utility(&payload).map(TaskRequest::Utility),
            TaskKind::Workflow => {
                if !payload.get("steps").is_some_and(Value::is_array) {
                    return Err(SwitchyardError::InvalidPayload(
                        "workflow payload requires a 'steps' array".into(),
                    ));
                }
                Ok(TaskRequest::Workflow(Value::Object(payload)))
            }
        }
    }

    /// Kind this request was parsed for.
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskRequest::Sports { .. } => TaskKind::Sports,
            TaskRequest::Research { .. } => TaskKind::Research,
            TaskRequest::Writer { .. } => TaskKind::Writer,
            TaskRequest::Reviewer { .. } => TaskKind::Reviewer,
            TaskRequest::Crypto { .. } => TaskKind::Crypto,
            TaskRequest::Utility(_) => TaskKind::Utility,
            TaskRequest::Workflow(_) => TaskKind::Workflow,
        }
    }

    /// JSON body forwarded to workers, or `None` for kinds not served by workers.
    pub fn worker_body(&self) -> Option<Value> {
        let (key, value, payload) = match self {
            TaskRequest::Sports { query, payload } => ("query", query, payload),
            TaskRequest::Research { topic, payload } => ("topic", topic, payload),
            TaskRequest::Writer { topic, payload } => ("topic", topic, payload),
            TaskRequest::Reviewer { content, payload } => ("content", content, payload),
            TaskRequest::Crypto { symbol, payload } => ("symbol", symbol, payload),
            TaskRequest::Utility(_) | TaskRequest::Workflow(_) => return None,
        };
        let mut body = payload.clone();
        body.insert(key.to_string(), Value::String(value.clone()));
        Some(Value::Object(body))
    }
}

fn required_str(
    payload: &Map<String, Value>,
    kind: TaskKind,
    field: &str,
) -> SwitchyardResult<String> {
    match payload.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(SwitchyardError::InvalidPayload(format!(
            "{kind}: '{field}' must not be empty"
        ))),
        Some(_) => Err(SwitchyardError::InvalidPayload(format!(
            "{kind}: '{field}' must be a string"
        ))),
        None => Err(SwitchyardError::InvalidPayload(format!(
            "{kind}: missing required field '{field}'"
        ))),
    }
}

fn parse_utility(payload: &Map<String, Value>) -> SwitchyardResult<UtilityRequest> {
    let kind = TaskKind::Utility;
    let api_id = match payload.get("api_id") {
        Some(_) => required_str(payload, kind, "api_id")?,
        None => required_str(payload, kind, "apiId")?,
    };
    let url = required_str(payload, kind, "url")?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SwitchyardError::InvalidPayload(format!(
            "utility: unsupported url '{url}', only http/https allowed"
        )));
    }

    let method = match payload.get("method").and_then(Value::as_str) {
        None => UtilityMethod::Get,
        Some(m) if m.eq_ignore_ascii_case("GET") => UtilityMethod::Get,
        Some(m) if m.eq_ignore_ascii_case("POST") => UtilityMethod::Post,
        Some(m) => {
            return Err(SwitchyardError::InvalidPayload(format!(
                "utility: unsupported method '{m}'. Use GET or POST."
            )))
        }
    };

    let params = match payload.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(SwitchyardError::InvalidPayload(
                "utility: 'params' must be an object".into(),
            ))
        }
    };

    let use_cache = payload
        .get("useCache")
        .or_else(|| payload.get("use_cache"))
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(UtilityRequest {
        api_id,
        url,
        method,
        params,
        body: payload.get("body").cloned(),
        use_cache,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_core::ErrorKind;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("sports".parse::<TaskKind>().unwrap(), TaskKind::Sports);
        assert_eq!(" Reviewer ".parse::<TaskKind>().unwrap(), TaskKind::Reviewer);
        let err = "astrology".parse::<TaskKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownTaskType);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, kind) in TaskKind::ALL.into_iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_missing_field_is_invalid_payload() {
        let err = TaskRequest::parse(TaskKind::Research, json!({"depth": 2})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
        assert!(err.to_string().contains("topic"));

        let err = TaskRequest::parse(TaskKind::Sports, json!({"query": 42})).unwrap_err();
        assert!(err.to_string().contains("must be a string"));

        let err = TaskRequest::parse(TaskKind::Writer, json!({"topic": "  "})).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));

        let err = TaskRequest::parse(TaskKind::Crypto, json!("BTC")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    }

    #[test]
    fn test_worker_body_keeps_extra_fields() {
        let req = TaskRequest::parse(TaskKind::Crypto, json!({"symbol": "btc", "window": "24h"}))
            .unwrap();
        assert_eq!(req.kind(), TaskKind::Crypto);
        let body = req.worker_body().unwrap();
        assert_eq!(body["symbol"], "BTC");
        assert_eq!(body["window"], "24h");
    }

    #[test]
    fn test_utility_parsing() {
        let req = TaskRequest::parse(
            TaskKind::Utility,
            json!({
                "apiId": "weather",
                "url": "https://api.example.com/v1",
                "params": {"city": "Lima"}
            }),
        )
        .unwrap();
        let TaskRequest::Utility(u) = req else {
            panic!("expected utility request");
        };
        assert_eq!(u.api_id, "weather");
        assert_eq!(u.method, UtilityMethod::Get);
        assert!(u.use_cache);
        assert_eq!(u.params["city"], "Lima");

        let err = TaskRequest::parse(
            TaskKind::Utility,
            json!({"apiId": "x", "url": "ftp://example.com"}),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);

        let err = TaskRequest::parse(
            TaskKind::Utility,
            json!({"apiId": "x", "url": "https://example.com", "method": "DELETE"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("DELETE"));
    }

    #[test]
    fn test_workflow_requires_steps() {
        assert!(TaskRequest::parse(TaskKind::Workflow, json!({"steps": []})).is_ok());
        let err = TaskRequest::parse(TaskKind::Workflow, json!({"workflowName": "x"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
        assert!(TaskRequest::parse(TaskKind::Workflow, json!({"steps": []}))
            .unwrap()
            .worker_body()
            .is_none());
    }
}
