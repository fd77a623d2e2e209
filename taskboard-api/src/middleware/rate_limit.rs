//! Per-client rate limiting
//!
//! Each client (keyed by the first `X-Forwarded-For` address, else the peer
//! address) gets a token bucket holding `max_requests` tokens that refills
//! evenly over `window_secs`. Defaults allow 100 requests per 15 minutes.
//!
//! # Headers
//!
//! Responses include:
//! - `X-RateLimit-Limit`: bucket capacity
//! - `X-RateLimit-Remaining`: tokens left
//! - `X-RateLimit-Reset`: seconds until the bucket is full again
//! - `Retry-After`: seconds to wait (429 responses only)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskboard_api::config::RateLimitConfig;
//! use taskboard_api::middleware::rate_limit::RateLimiter;
//!
//! let limiter = Arc::new(RateLimiter::new(&RateLimitConfig {
//!     max_requests: 100,
//!     window_secs: 900,
//! }));
//! assert!(limiter.check("203.0.113.7").allowed);
//! ```

use crate::app::AppState;
use crate::config::RateLimitConfig;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Buckets are pruned once the map grows past this many clients
const PRUNE_THRESHOLD: usize = 10_000;

/// Token bucket state for one client
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    /// Refills tokens based on elapsed time
    fn refill(&mut self, rate: f64, capacity: u32, now: Instant) {
        let elapsed_secs = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_secs * rate).min(capacity as f64);
        self.last_refill = now;
    }

    /// Attempts to consume N tokens
    fn try_consume(&mut self, count: f64) -> bool {
        if self.tokens >= count {
            self.tokens -= count;
            true
        } else {
            false
        }
    }

    /// Calculates seconds until N tokens available
    fn seconds_until_available(&self, count: f64, rate: f64) -> u64 {
        let deficit = count - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }
}

/// Result of rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether request is allowed
    pub allowed: bool,

    /// Bucket capacity
    pub limit: u32,

    /// Tokens remaining
    pub remaining: u32,

    /// Seconds until the bucket is full (or, when rejected, until the next token)
    pub reset_after: u64,
}

/// In-process token bucket limiter shared by all requests
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    refill_rate: f64,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.max_requests.max(1);
        let window = config.window_secs.max(1) as f64;

        Self {
            capacity,
            refill_rate: capacity as f64 / window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consumes one token for `client`
    pub fn check(&self, client: &str) -> RateLimitResult {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> RateLimitResult {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if buckets.len() > PRUNE_THRESHOLD {
            let full_after = Duration::from_secs_f64(self.capacity as f64 / self.refill_rate);
            buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < full_after);
        }

        let bucket = buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, now));
        bucket.refill(self.refill_rate, self.capacity, now);

        let allowed = bucket.try_consume(1.0);
        let reset_after = if allowed {
            bucket.seconds_until_available(self.capacity as f64, self.refill_rate)
        } else {
            bucket.seconds_until_available(1.0, self.refill_rate)
        };

        RateLimitResult {
            allowed,
            limit: self.capacity,
            remaining: bucket.tokens.floor() as u32,
            reset_after,
        }
    }
}

/// Identifies the client for rate limiting
fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware layer
///
/// # Errors
///
/// - 429 Too Many Requests: budget for this client is spent
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request);
    let result = state.rate_limiter.check(&client);

    let mut response = if result.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        ApiError::RateLimitExceeded {
            retry_after: result.reset_after,
            message: "Too many requests from this IP, please try again later.".to_string(),
        }
        .into_response()
    };

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(result.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(result.reset_after));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window_secs,
        })
    }

    #[test]
    fn test_token_bucket_consume() {
        let mut bucket = TokenBucket::new(10, Instant::now());
        assert!(bucket.try_consume(1.0));
        assert_eq!(bucket.tokens, 9.0);
        assert!(bucket.try_consume(5.0));
        assert_eq!(bucket.tokens, 4.0);
        assert!(!bucket.try_consume(10.0));
        assert_eq!(bucket.tokens, 4.0); // Unchanged after failed attempt
    }

    #[test]
    fn test_token_bucket_refill_capped() {
        let start = Instant::now();
        let mut bucket = TokenBucket {
            tokens: 95.0,
            last_refill: start,
        };

        bucket.refill(1.0, 100, start + Duration::from_secs(10));
        assert_eq!(bucket.tokens, 100.0);
    }

    #[test]
    fn test_token_bucket_seconds_until_available() {
        let bucket = TokenBucket {
            tokens: 2.0,
            last_refill: Instant::now(),
        };

        assert_eq!(bucket.seconds_until_available(5.0, 1.0), 3);
        assert_eq!(bucket.seconds_until_available(1.0, 1.0), 0);
    }

    #[test]
    fn test_limiter_blocks_after_budget() {
        let limiter = limiter(3, 900);
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let result = limiter.check_at("10.0.0.1", now);
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }

        let blocked = limiter.check_at("10.0.0.1", now);
        assert!(!blocked.allowed);
        assert_eq!(blocked.reset_after, 300);

        // other clients have their own bucket
        assert!(limiter.check_at("10.0.0.2", now).allowed);

        // one token comes back after window / max
        assert!(limiter.check_at("10.0.0.1", now + Duration::from_secs(300)).allowed);
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.9");

        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5555))));
        assert_eq!(client_key(&request), "192.0.2.4");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&request), "unknown");
    }
}
