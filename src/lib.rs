//! # Trestle
//!
//! A resilient HTTP client with a composable middleware pipeline: retry with
//! configurable backoff, a three-state circuit breaker, token-bucket rate
//! limiting, an RFC-style response cache with conditional revalidation,
//! transparent compression, proxy selection, and Prometheus metrics.
//!
//! ## Features
//!
//! - **Retry with Backoff**: fixed, linear, exponential, and jittered
//!   exponential strategies with a custom retry predicate hook
//! - **Circuit Breaker**: closed/open/half-open state machine with a
//!   pluggable trip decision and state-change observer
//! - **Rate Limiting**: token bucket, global or per host, wait-or-fail
//! - **HTTP Caching**: freshness from `Cache-Control`/`Expires`, conditional
//!   revalidation via `ETag`/`Last-Modified`, bounded in-memory LRU backend
//! - **Compression**: gzip/deflate request encoding and response decoding
//! - **Proxy Selection**: per-request overrides, bypass rules, system proxies
//! - **Metrics**: Prometheus counters, histograms, and an in-flight gauge
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trestle::{HttpClient, HttpClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(HttpClientConfig::default());
//!
//!     let response = client
//!         .get("https://api.example.com/users")
//!         .send()
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## With the Resilience Stack
//!
//! ```rust,no_run
//! use trestle::{
//!     CircuitBreakerConfig, HttpClient, HttpClientConfig, RateLimitConfig, RetryConfig,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HttpClientConfig::builder()
//!         .timeout(Duration::from_secs(30))
//!         .retry(RetryConfig::exponential(3, Duration::from_millis(100)))
//!         .circuit_breaker(CircuitBreakerConfig::default())
//!         .rate_limit(RateLimitConfig::per_second(50.0, 100))
//!         .default_cache()
//!         .default_compression()
//!         .build();
//!
//!     let client = HttpClient::new(config);
//!
//!     let response = client
//!         .post("https://api.example.com/orders")
//!         .json(&serde_json::json!({"item": "widget", "quantity": 5}))
//!         .send()
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```

mod cache;
mod circuit_breaker;
mod client;
mod compression;
mod config;
mod error;
mod metrics;
mod middleware;
mod proxy;
mod rate_limit;
mod request;
mod response;
mod retry;
mod transport;

pub use cache::{
    CacheBackend, CacheConfig, CacheEntry, CacheMiddleware, CacheStats, MemoryBackend,
    SkipCachePredicate,
};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMiddleware, CircuitState, Counts,
    ReadyToTrip, StateChangeHandler,
};
pub use client::HttpClient;
pub use compression::{CompressionConfig, CompressionMiddleware, Encoding};
pub use config::{HttpClientConfig, HttpClientConfigBuilder};
pub use error::{ErrorKind, HttpClientError, Result};
pub use metrics::{HttpMetrics, MetricsConfig, MetricsMiddleware};
pub use middleware::{
    LoggingMiddleware, Middleware, MiddlewareChain, RequestIdMiddleware, RequestOverrides,
    TimeoutMiddleware,
};
pub use proxy::{ProxyConfig, ProxyRule};
pub use rate_limit::{RateLimitConfig, RateLimitMiddleware, RateLimiter};
pub use request::RequestBuilder;
pub use response::Response;
pub use retry::{BackoffStrategy, RetryConfig, RetryMiddleware, RetryPredicate};

// Re-export common types
pub use bytes::Bytes;
pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use trestle::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::{CacheBackend, CacheConfig, CacheStats};
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts};
    pub use crate::client::HttpClient;
    pub use crate::compression::CompressionConfig;
    pub use crate::config::{HttpClientConfig, HttpClientConfigBuilder};
    pub use crate::error::{ErrorKind, HttpClientError, Result};
    pub use crate::metrics::MetricsConfig;
    pub use crate::middleware::{Middleware, MiddlewareChain};
    pub use crate::proxy::ProxyConfig;
    pub use crate::rate_limit::RateLimitConfig;
    pub use crate::request::RequestBuilder;
    pub use crate::response::Response;
    pub use crate::retry::{BackoffStrategy, RetryConfig};
    pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
}
