use crate::cache::ResponseCache;
use crate::rate_limit::RateLimiter;
use crate::task::{UtilityMethod, UtilityRequest};
use crate::transport::map_send_error;
use serde_json::{json, Value};
use std::time::Duration;
use switchyard_core::{SwitchyardError, SwitchyardResult, UtilityConfig};
use tracing::{debug, info, warn};

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Calls arbitrary external APIs for the utility kind, behind a per-API rate
/// limit and a TTL response cache.
pub struct UtilityClient {
    client: reqwest::Client,
    cache: ResponseCache,
    limiter: RateLimiter,
    timeout: Duration,
}

impl UtilityClient {
    /// Build the client, cache and limiter from config.
    pub fn new(config: &UtilityConfig) -> SwitchyardResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_seconds);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| SwitchyardError::Http(format!("failed to build utility client: {e}")))?;
        Ok(Self {
            client,
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_seconds)),
            limiter: RateLimiter::new(config.rate_limit_burst, config.rate_limit_per_second),
            timeout,
        })
    }

    /// Response cache, exposed for inspection.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Rate limiter, exposed for inspection.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Perform the request. Cached GET responses are served without touching
    /// the rate limit.
    pub async fn call(&self, req: &UtilityRequest) -> SwitchyardResult<Value> {
        let cacheable = req.use_cache && req.method == UtilityMethod::Get;
        let key = ResponseCache::key(req.method.as_str(), &req.url, &req.params);
        if cacheable {
            if let Some(data) = self.cache.get(&key) {
                debug!(api_id = %req.api_id, "Utility cache hit");
                return Ok(envelope(&req.api_id, data, true));
            }
        }

        if let Err(wait) = self.limiter.acquire(&req.api_id).await {
            warn!(
                api_id = %req.api_id,
                retry_after_ms = wait.map(|w| w.as_millis() as u64),
                "Utility call rate limited"
            );
            let hint = match wait {
                Some(w) => format!(", retry in {:.1}s", w.as_secs_f64()),
                None => String::new(),
            };
            return Err(SwitchyardError::RateLimited(format!(
                "api '{}' exceeded its request budget{hint}",
                req.api_id
            )));
        }
        let tokens_left = self.limiter.available(&req.api_id).await;
        debug!(api_id = %req.api_id, tokens_left, "Utility call admitted");

        info!(api_id = %req.api_id, url = %req.url, method = req.method.as_str(), "Utility call");
        let request = match req.method {
            UtilityMethod::Get => {
                let query: Vec<(String, String)> = req
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), query_value(v)))
                    .collect();
                self.client.get(&req.url).query(&query)
            }
            UtilityMethod::Post => {
                let body = req
                    .body
                    .clone()
                    .unwrap_or_else(|| Value::Object(req.params.clone()));
                self.client.post(&req.url).json(&body)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| map_send_error(&req.api_id, &e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SwitchyardError::WorkerFailure {
                worker_id: req.api_id.clone(),
                reason: format!("external API returned HTTP {status}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_send_error(&req.api_id, &e, self.timeout))?;
        if bytes.len() > MAX_RESPONSE_SIZE {
            return Err(SwitchyardError::WorkerFailure {
                worker_id: req.api_id.clone(),
                reason: format!(
                    "response too large: {} bytes (max: {MAX_RESPONSE_SIZE} bytes)",
                    bytes.len()
                ),
            });
        }
        let data = serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        if cacheable {
            self.cache.set(key, data.clone());
        }
        Ok(envelope(&req.api_id, data, false))
    }
}

fn envelope(api_id: &str, data: Value, cached: bool) -> Value {
    json!({ "apiId": api_id, "data": data, "cached": cached })
}

fn query_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
