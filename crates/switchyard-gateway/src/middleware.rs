use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// API keys accepted by the gateway. With no keys every route is open.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    keys: HashSet<String>,
}

impl AuthConfig {
    /// Blank entries are ignored.
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().filter(|k| !k.trim().is_empty()).collect(),
        }
    }

    /// False when no keys are configured.
    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Number of accepted keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn accepts(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// `?api_key=` query parameter.
#[derive(Deserialize, Default)]
pub struct AuthQuery {
    /// Key passed in the query string.
    pub api_key: Option<String>,
}

/// Key presented by the caller; the bearer header wins over the query string.
fn presented_key(headers: &HeaderMap, query: AuthQuery) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|k| k.trim().to_string())
        .or(query.api_key)
}

/// Rejects `/api` requests without a configured key. `/health` stays open.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    match presented_key(&headers, query) {
        Some(key) if auth.accepts(&key) => next.run(request).await,
        Some(_) => {
            warn!(path = %path, "Rejected request: invalid API key");
            unauthorized("invalid API key")
        }
        None => {
            warn!(path = %path, "Rejected request: missing API key");
            unauthorized("API key required")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message, "errorKind": "unauthorized" })),
    )
        .into_response()
}
