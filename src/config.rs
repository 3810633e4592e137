//! HTTP client configuration.

use crate::cache::CacheConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::compression::CompressionConfig;
use crate::metrics::MetricsConfig;
use crate::middleware::Middleware;
use crate::proxy::ProxyConfig;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// HTTP client configuration.
#[derive(Clone)]
pub struct HttpClientConfig {
    /// Base URL prepended to relative request paths.
    pub base_url: Option<String>,
    /// Default end-to-end timeout; a shorter per-request deadline wins.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Headers merged into every request; per-request values win.
    pub default_headers: Vec<(String, String)>,
    /// Basic-auth credentials attached as `Authorization`.
    pub basic_auth: Option<(String, String)>,
    /// Surface 4xx/5xx responses as errors instead of returning them.
    pub error_for_status: bool,
    /// Retry configuration.
    pub retry: Option<RetryConfig>,
    /// Circuit breaker configuration.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Rate limiter configuration.
    pub rate_limit: Option<RateLimitConfig>,
    /// Response cache configuration.
    pub cache: Option<CacheConfig>,
    /// Compression configuration.
    pub compression: Option<CompressionConfig>,
    /// Proxy configuration.
    pub proxy: Option<ProxyConfig>,
    /// Metrics configuration.
    pub metrics: Option<MetricsConfig>,
    /// User middlewares, appended outermost in registration order.
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// Emit request/response log events.
    pub log_requests: bool,
    /// Connection pool idle timeout.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User agent string.
    pub user_agent: String,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl std::fmt::Debug for HttpClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("error_for_status", &self.error_for_status)
            .field("retry", &self.retry)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("rate_limit", &self.rate_limit)
            .field("cache", &self.cache)
            .field("compression", &self.compression)
            .field("proxy", &self.proxy)
            .field("metrics", &self.metrics)
            .field("middlewares", &self.middlewares.len())
            .field("log_requests", &self.log_requests)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            default_headers: Vec::new(),
            basic_auth: None,
            error_for_status: false,
            retry: None,
            circuit_breaker: None,
            rate_limit: None,
            cache: None,
            compression: None,
            proxy: None,
            metrics: None,
            middlewares: Vec::new(),
            log_requests: true,
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            user_agent: format!("trestle/{}", env!("CARGO_PKG_VERSION")),
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

impl HttpClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client configuration.
#[derive(Debug, Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL for all requests.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the default end-to-end timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Add a default header for all requests.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Attach basic-auth credentials to every request.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.basic_auth = Some((username.into(), password.into()));
        self
    }

    /// Surface 4xx/5xx responses as errors.
    pub fn error_for_status(mut self, enable: bool) -> Self {
        self.config.error_for_status = enable;
        self
    }

    /// Set retry configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.config.retry = Some(config);
        self
    }

    /// Set circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = Some(config);
        self
    }

    /// Set rate limiter configuration.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Set response cache configuration.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.config.cache = Some(config);
        self
    }

    /// Enable the response cache with default settings.
    pub fn default_cache(mut self) -> Self {
        self.config.cache = Some(CacheConfig::default());
        self
    }

    /// Set compression configuration.
    pub fn compression(mut self, config: CompressionConfig) -> Self {
        self.config.compression = Some(config);
        self
    }

    /// Enable compression with default settings.
    pub fn default_compression(mut self) -> Self {
        self.config.compression = Some(CompressionConfig::default());
        self
    }

    /// Set the client-wide proxy URL.
    pub fn proxy(mut self, url: impl AsRef<str>) -> Self {
        match url::Url::parse(url.as_ref()) {
            Ok(parsed) => {
                let proxy = self.config.proxy.take().unwrap_or_default();
                self.config.proxy = Some(proxy.with_proxy(parsed));
            }
            Err(e) => error!(error = %e, "Invalid proxy URL, ignoring"),
        }
        self
    }

    /// Set proxy basic-auth credentials.
    pub fn proxy_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let proxy = self.config.proxy.take().unwrap_or_default();
        self.config.proxy = Some(proxy.with_auth(username, password));
        self
    }

    /// Add no-proxy bypass rules.
    pub fn no_proxy<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let proxy = self.config.proxy.take().unwrap_or_default();
        self.config.proxy = Some(proxy.with_bypass(rules));
        self
    }

    /// Honour proxy settings from the environment.
    pub fn system_proxy(mut self, enable: bool) -> Self {
        let proxy = self.config.proxy.take().unwrap_or_default();
        self.config.proxy = Some(proxy.with_system_proxy(enable));
        self
    }

    /// Set metrics configuration.
    pub fn metrics(mut self, config: MetricsConfig) -> Self {
        self.config.metrics = Some(config);
        self
    }

    /// Append a user middleware; user middlewares run outermost, in the
    /// order they were added.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.config.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append several user middlewares.
    pub fn middlewares<I>(mut self, middlewares: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.config.middlewares.extend(middlewares);
        self
    }

    /// Enable or disable request/response logging.
    pub fn log_requests(mut self, enable: bool) -> Self {
        self.config.log_requests = enable;
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable following redirects.
    pub fn follow_redirects(mut self, enable: bool) -> Self {
        self.config.follow_redirects = enable;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}
