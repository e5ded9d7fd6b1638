//! Per-client-IP rate limiting for the `/api` routes.
//!
//! Each client IP gets a token bucket holding `max_requests` tokens that
//! refills evenly over `window`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use tracing::warn;

use crate::api::error::ApiError;
use crate::{Error, Result};

/// Message returned with 429 responses.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

/// Buckets kept before idle ones are swept.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Requests allowed per window (burst capacity).
    pub max_requests: u32,
    /// Time for an empty bucket to refill completely.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

impl RateLimitConfig {
    /// Supported variables: `RATE_LIMIT_MAX`, `RATE_LIMIT_WINDOW_SECS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("RATE_LIMIT_MAX").filter(|v| !v.trim().is_empty()) {
            config.max_requests = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    Error::config(format!("RATE_LIMIT_MAX must be a positive integer, got '{}'", raw))
                })?;
        }

        if let Some(raw) = lookup("RATE_LIMIT_WINDOW_SECS").filter(|v| !v.trim().is_empty()) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    Error::config(format!(
                        "RATE_LIMIT_WINDOW_SECS must be a positive integer, got '{}'",
                        raw
                    ))
                })?;
            config.window = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Tokens added per second.
    fn refill_rate(&self) -> f64 {
        self.max_requests as f64 / self.window.as_secs_f64().max(f64::MIN_POSITIVE)
    }
}

/// Token bucket for one client.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, capacity: u32, refill_rate: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * refill_rate).min(capacity as f64);
        self.last_refill = now;
    }

    /// Take a token, or report how long until one is available.
    fn try_acquire(&mut self, refill_rate: f64) -> std::result::Result<(), Duration> {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(tokens_needed / refill_rate))
        }
    }
}

/// Shared per-IP limiter. Clones share state.
#[derive(Debug, Clone)]
pub struct IpRateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<Option<IpAddr>, TokenBucket>>>,
}

impl IpRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Try to admit one request from `client`.
    ///
    /// Requests without a known peer address share one bucket.
    pub fn check(&self, client: Option<IpAddr>) -> std::result::Result<(), Duration> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: Option<IpAddr>, now: Instant) -> std::result::Result<(), Duration> {
        let capacity = self.config.max_requests;
        let refill_rate = self.config.refill_rate();

        let mut buckets = self.buckets.lock();
        if buckets.len() >= MAX_TRACKED_CLIENTS && !buckets.contains_key(&client) {
            Self::sweep(&mut buckets, capacity, refill_rate, now);
        }

        let bucket = buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::full(capacity, now));
        bucket.refill(capacity, refill_rate, now);
        bucket.try_acquire(refill_rate)
    }

    /// Drop buckets that have refilled completely; they hold no state.
    fn sweep(
        buckets: &mut HashMap<Option<IpAddr>, TokenBucket>,
        capacity: u32,
        refill_rate: f64,
        now: Instant,
    ) {
        buckets.retain(|_, bucket| {
            bucket.refill(capacity, refill_rate, now);
            bucket.tokens < capacity as f64
        });
    }
}

/// Middleware function for per-IP rate limiting.
///
/// The peer address comes from `ConnectInfo`, so the server must be started
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub async fn rate_limit(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match limiter.check(client) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(client = ?client, path = %request.uri().path(), "Rate limit exceeded");
            let mut response = ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                RATE_LIMIT_MESSAGE,
            )
            .into_response();
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}
