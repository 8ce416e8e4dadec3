use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::token::parse_token;
use crate::server::AppState;

/// Token-bucket parameters. Defaults allow 30 requests per minute with a
/// burst of 30.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            capacity: 30.0,
            refill_per_sec: 30.0 / 60.0,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-caller token bucket. Keyed by the session token's lookup prefix, so
/// the check stays cheap (no password hashing) and survives across requests.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.policy.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.policy.refill_per_sec)
            .min(self.policy.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Middleware applying the rate limit to state-changing routes. Requests
/// without a parseable bearer token share an "anonymous" bucket; they will
/// be rejected by the auth extractors anyway.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .and_then(|raw| parse_token(raw).ok())
        .map(|(lookup, _)| lookup)
        .unwrap_or_else(|| "anonymous".to_string());

    if !state.rate_limiter.try_acquire(&key) {
        let body = json!({
            "success": false,
            "error": "Too many requests, slow down",
        });
        return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    }

    next.run(request).await
}
