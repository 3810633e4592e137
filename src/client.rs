//! HTTP client implementation.

use http::Method;
use std::sync::Arc;

use crate::cache::{CacheBackend, CacheMiddleware, CacheStats, MemoryBackend};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerMiddleware};
use crate::compression::CompressionMiddleware;
use crate::metrics::{HttpMetrics, MetricsMiddleware};
use crate::middleware::{
    LoggingMiddleware, MiddlewareChain, RequestOverrides, TimeoutMiddleware,
};
use crate::rate_limit::{RateLimitMiddleware, RateLimiter};
use crate::retry::RetryMiddleware;
use crate::transport::Transport;
use crate::{HttpClientConfig, RequestBuilder, Response, Result};

/// Resilient HTTP client.
///
/// Owns the middleware chain and all resilience primitives. The chain is
/// assembled once here and immutable afterwards; layer order outer to inner
/// is user middlewares, metrics, logging, timeout, rate limit, cache, retry,
/// circuit breaker, compression, dispatch. Cloning is cheap and clones share
/// all state.
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<HttpClientConfig>,
    chain: Arc<MiddlewareChain>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Self {
        let transport = Transport::new(&config);
        let mut chain = MiddlewareChain::new(transport);

        for middleware in &config.middlewares {
            chain = chain.with_middleware(middleware.clone());
        }

        if let Some(metrics_config) = &config.metrics {
            match HttpMetrics::new(metrics_config) {
                Ok(metrics) => {
                    chain = chain
                        .with_middleware(Arc::new(MetricsMiddleware::new(Arc::new(metrics))));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to register HTTP metrics, disabling");
                }
            }
        }

        if config.log_requests {
            chain = chain.with_middleware(Arc::new(LoggingMiddleware));
        }

        chain = chain.with_middleware(Arc::new(TimeoutMiddleware));

        let rate_limiter = config
            .rate_limit
            .clone()
            .map(|c| Arc::new(RateLimiter::new(c)));
        if let Some(limiter) = &rate_limiter {
            chain = chain.with_middleware(Arc::new(RateLimitMiddleware::new(limiter.clone())));
        }

        let cache_backend: Option<Arc<dyn CacheBackend>> = config.cache.as_ref().map(|c| {
            Arc::new(MemoryBackend::new(
                c.max_entries,
                c.max_total_bytes,
                c.max_entry_bytes,
            )) as Arc<dyn CacheBackend>
        });
        if let (Some(cache_config), Some(backend)) = (&config.cache, &cache_backend) {
            chain = chain.with_middleware(Arc::new(CacheMiddleware::new(
                cache_config.clone(),
                backend.clone(),
            )));
        }

        if let Some(retry_config) = &config.retry {
            chain = chain.with_middleware(Arc::new(RetryMiddleware::new(retry_config.clone())));
        }

        let circuit_breaker = config
            .circuit_breaker
            .clone()
            .map(|c| Arc::new(CircuitBreaker::new(c)));
        if let Some(breaker) = &circuit_breaker {
            chain =
                chain.with_middleware(Arc::new(CircuitBreakerMiddleware::new(breaker.clone())));
        }

        if let Some(compression_config) = &config.compression {
            chain = chain.with_middleware(Arc::new(CompressionMiddleware::new(
                compression_config.clone(),
            )));
        }

        Self {
            config: Arc::new(config),
            chain: Arc::new(chain),
            circuit_breaker,
            rate_limiter,
            cache_backend,
        }
    }

    /// Create a new HTTP client with default configuration.
    pub fn default_client() -> Self {
        Self::new(HttpClientConfig::default())
    }

    /// Get the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// The circuit breaker, when configured.
    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// The rate limiter, when configured.
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Cache counters, when the cache is configured.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache_backend.as_ref().map(|b| b.stats())
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url.into())
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url.into())
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, url.into())
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, url.into())
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, url.into())
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, url.into())
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, url.into())
    }

    /// Execute a prepared request through the pipeline.
    pub(crate) async fn execute(
        &self,
        request: reqwest::Request,
        overrides: RequestOverrides,
    ) -> Result<Response> {
        let response = self.chain.execute(request, overrides).await?;
        if self.config.error_for_status {
            response.error_for_status()
        } else {
            Ok(response)
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::default_client()
    }
}
