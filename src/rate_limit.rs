//! Token-bucket rate limiting for outbound requests.

use crate::middleware::{Middleware, MiddlewareChain};
use crate::{HttpClientError, Response, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Request;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Key used when requests are not limited per host.
const GLOBAL_KEY: &str = "global";

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Token refill rate per second.
    pub requests_per_sec: f64,
    /// Bucket capacity (maximum instantaneous burst).
    pub burst_size: u64,
    /// Keep one bucket per request host instead of a single global bucket.
    pub per_host: bool,
    /// Sleep until a token frees instead of failing fast.
    pub wait_on_limit: bool,
    /// Upper bound on the wait; longer projected waits fail immediately.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_sec: 10.0,
            burst_size: 20,
            per_host: false,
            wait_on_limit: true,
            max_wait: Duration::from_secs(2),
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration with the given rate and burst.
    pub fn per_second(requests_per_sec: f64, burst_size: u64) -> Self {
        Self {
            requests_per_sec,
            burst_size,
            ..Default::default()
        }
    }

    /// Limit each request host independently.
    pub fn with_per_host(mut self, per_host: bool) -> Self {
        self.per_host = per_host;
        self
    }

    /// Configure the wait-on-limit behaviour.
    pub fn with_wait(mut self, wait_on_limit: bool, max_wait: Duration) -> Self {
        self.wait_on_limit = wait_on_limit;
        self.max_wait = max_wait;
        self
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter.
///
/// Buckets live in a concurrent map and are created lazily per key. They are
/// never evicted; the key set is "global" or the bounded set of request
/// hosts.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.requests_per_sec)
            .min(self.config.burst_size as f64);
        bucket.last_refill = now;
    }

    /// Try to consume one token; on failure returns the projected wait until
    /// a token frees.
    pub fn try_acquire(&self, key: &str) -> std::result::Result<(), Duration> {
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.config.burst_size as f64,
                last_refill: Instant::now(),
            });

        self.refill(&mut entry);

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - entry.tokens;
            Err(Duration::from_secs_f64(
                deficit / self.config.requests_per_sec,
            ))
        }
    }

    /// Consume one token, sleeping when allowed by the config and deadline.
    pub async fn acquire(&self, key: &str, deadline: Option<Instant>) -> Result<()> {
        loop {
            let wait = match self.try_acquire(key) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            let refused = !self.config.wait_on_limit
                || wait > self.config.max_wait
                || deadline
                    .map(|d| Instant::now() + wait > d)
                    .unwrap_or(false);
            if refused {
                return Err(HttpClientError::RateLimited {
                    key: key.to_string(),
                    retry_after: wait,
                });
            }

            debug!(key, wait_ms = wait.as_millis() as u64, "Rate limited, waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Remaining whole tokens for a key.
    pub fn remaining(&self, key: &str) -> u64 {
        match self.buckets.get_mut(key) {
            Some(mut bucket) => {
                self.refill(&mut bucket);
                bucket.tokens as u64
            }
            None => self.config.burst_size,
        }
    }
}

/// Rate limit middleware throttling outbound requests.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    /// Create a new rate limit middleware.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn handle(&self, request: Request, next: &MiddlewareChain) -> Result<Response> {
        let key = if self.limiter.config.per_host {
            request.url().host_str().unwrap_or(GLOBAL_KEY).to_string()
        } else {
            GLOBAL_KEY.to_string()
        };

        self.limiter
            .acquire(&key, next.overrides().deadline)
            .await?;
        next.next(request).await
    }
}
