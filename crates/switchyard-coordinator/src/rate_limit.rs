use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Buckets untouched for this long are dropped once the map grows past
/// [`PRUNE_ABOVE`] entries.
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(600);
const PRUNE_ABOVE: usize = 256;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token buckets for outbound utility calls, one per `api_id`.
///
/// Each API starts with `burst` tokens and regains `per_second` tokens per
/// second up to `burst`.
pub struct RateLimiter {
    burst: f64,
    per_second: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Limiter allowing `burst` back-to-back calls per API.
    pub fn new(burst: f64, per_second: f64) -> Self {
        Self {
            burst,
            per_second,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `api_id`.
    ///
    /// On refusal returns how long until a token is available, or `None` when
    /// the bucket never refills.
    pub async fn acquire(&self, api_id: &str) -> Result<(), Option<Duration>> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        if buckets.len() > PRUNE_ABOVE {
            buckets.retain(|_, b| now.duration_since(b.refilled_at) < IDLE_BUCKET_TTL);
        }

        let bucket = buckets
            .entry(api_id.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.burst,
                refilled_at: now,
            });
        self.top_up(bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }
        if self.per_second <= 0.0 {
            return Err(None);
        }
        let missing = 1.0 - bucket.tokens;
        // an unrepresentable wait is reported like a bucket that never refills
        Err(Duration::try_from_secs_f64(missing / self.per_second).ok())
    }

    /// Whole tokens `api_id` could spend right now.
    pub async fn available(&self, api_id: &str) -> u32 {
        let mut buckets = self.buckets.lock().await;
        let tokens = match buckets.get_mut(api_id) {
            Some(bucket) => {
                self.top_up(bucket, Instant::now());
                bucket.tokens
            }
            None => self.burst,
        };
        tokens.floor().max(0.0) as u32
    }

    /// Number of APIs with a live bucket.
    pub async fn tracked_apis(&self) -> usize {
        self.buckets.lock().await.len()
    }

    fn top_up(&self, bucket: &mut Bucket, now: Instant) {
        let gained = now.duration_since(bucket.refilled_at).as_secs_f64() * self.per_second;
        bucket.tokens = (bucket.tokens + gained).min(self.burst);
        bucket.refilled_at = now;
    }
}
