//! Prometheus instrumentation for the request pipeline.

use crate::middleware::{Middleware, MiddlewareChain};
use crate::{Response, Result};
use async_trait::async_trait;
use prometheus::{
    CounterVec, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
};
use reqwest::Request;
use std::sync::Arc;
use std::time::Instant;

/// Metrics configuration.
///
/// The registry is an external collaborator; the recorder registers its
/// vectors there but does not own metric lifetime.
#[derive(Clone)]
pub struct MetricsConfig {
    /// Metric name namespace prefix.
    pub namespace: String,
    /// Metric name subsystem prefix.
    pub subsystem: String,
    /// Add a `host` label to the request counter and histograms.
    pub per_host: bool,
    /// Duration histogram buckets, in seconds.
    pub duration_buckets: Vec<f64>,
    /// Size histogram buckets, in bytes.
    pub size_buckets: Vec<f64>,
    /// Target registry.
    pub registry: Registry,
}

impl std::fmt::Debug for MetricsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsConfig")
            .field("namespace", &self.namespace)
            .field("subsystem", &self.subsystem)
            .field("per_host", &self.per_host)
            .finish()
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "trestle".to_string(),
            subsystem: "http".to_string(),
            per_host: false,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5,
                10.0,
            ],
            size_buckets: vec![100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0],
            registry: Registry::new(),
        }
    }
}

impl MetricsConfig {
    /// Use the given registry.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the namespace and subsystem prefixes.
    pub fn with_prefixes(
        mut self,
        namespace: impl Into<String>,
        subsystem: impl Into<String>,
    ) -> Self {
        self.namespace = namespace.into();
        self.subsystem = subsystem.into();
        self
    }

    /// Include a `host` label on request metrics.
    pub fn with_per_host(mut self, per_host: bool) -> Self {
        self.per_host = per_host;
        self
    }

    /// Set the duration histogram buckets.
    pub fn with_duration_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.duration_buckets = buckets;
        self
    }

    /// Set the size histogram buckets.
    pub fn with_size_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.size_buckets = buckets;
        self
    }

    fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help)
            .namespace(self.namespace.clone())
            .subsystem(self.subsystem.clone())
    }

    fn histogram_opts(&self, name: &str, help: &str, buckets: Vec<f64>) -> HistogramOpts {
        HistogramOpts::new(name, help)
            .namespace(self.namespace.clone())
            .subsystem(self.subsystem.clone())
            .buckets(buckets)
    }
}

/// Metric vectors recorded per request.
pub struct HttpMetrics {
    per_host: bool,
    requests: CounterVec,
    errors: CounterVec,
    duration: HistogramVec,
    request_size: HistogramVec,
    response_size: HistogramVec,
    in_flight: IntGauge,
}

impl HttpMetrics {
    /// Build the vectors and register them with the configured registry.
    pub fn new(config: &MetricsConfig) -> prometheus::Result<Self> {
        let request_labels: &[&str] = if config.per_host {
            &["method", "host", "status"]
        } else {
            &["method", "status"]
        };
        let size_labels: &[&str] = if config.per_host {
            &["method", "host"]
        } else {
            &["method"]
        };

        let requests = CounterVec::new(
            config.opts("requests_total", "Total number of HTTP requests"),
            request_labels,
        )?;
        let errors = CounterVec::new(
            config.opts("errors_total", "Total number of failed HTTP requests"),
            &["kind"],
        )?;
        let duration = HistogramVec::new(
            config.histogram_opts(
                "request_duration_seconds",
                "End-to-end HTTP request duration in seconds",
                config.duration_buckets.clone(),
            ),
            size_labels,
        )?;
        let request_size = HistogramVec::new(
            config.histogram_opts(
                "request_size_bytes",
                "HTTP request body size in bytes",
                config.size_buckets.clone(),
            ),
            size_labels,
        )?;
        let response_size = HistogramVec::new(
            config.histogram_opts(
                "response_size_bytes",
                "HTTP response body size in bytes",
                config.size_buckets.clone(),
            ),
            size_labels,
        )?;
        let in_flight = IntGauge::with_opts(config.opts(
            "requests_in_flight",
            "Number of HTTP requests currently in flight",
        ))?;

        config.registry.register(Box::new(requests.clone()))?;
        config.registry.register(Box::new(errors.clone()))?;
        config.registry.register(Box::new(duration.clone()))?;
        config.registry.register(Box::new(request_size.clone()))?;
        config.registry.register(Box::new(response_size.clone()))?;
        config.registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            per_host: config.per_host,
            requests,
            errors,
            duration,
            request_size,
            response_size,
            in_flight,
        })
    }

    fn request_labels<'a>(
        &self,
        method: &'a str,
        host: &'a str,
        status: &'a str,
    ) -> Vec<&'a str> {
        if self.per_host {
            vec![method, host, status]
        } else {
            vec![method, status]
        }
    }

    fn size_labels<'a>(&self, method: &'a str, host: &'a str) -> Vec<&'a str> {
        if self.per_host {
            vec![method, host]
        } else {
            vec![method]
        }
    }
}

fn status_class(status: u16) -> &'static str {
    match status / 100 {
        1 => "1xx",
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "other",
    }
}

/// RAII guard keeping the in-flight gauge balanced on every exit path.
struct InFlightGuard {
    metrics: Arc<HttpMetrics>,
}

impl InFlightGuard {
    fn enter(metrics: Arc<HttpMetrics>) -> Self {
        metrics.in_flight.inc();
        Self { metrics }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.in_flight.dec();
    }
}

/// Metrics middleware, outermost in the built-in stack.
pub struct MetricsMiddleware {
    metrics: Arc<HttpMetrics>,
}

impl MetricsMiddleware {
    /// Create a new metrics middleware.
    pub fn new(metrics: Arc<HttpMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn handle(&self, request: Request, next: &MiddlewareChain) -> Result<Response> {
        let method = request.method().to_string();
        let host = request.url().host_str().unwrap_or("").to_string();
        let request_bytes = request
            .body()
            .and_then(|b| b.as_bytes())
            .map(<[u8]>::len)
            .unwrap_or(0);

        let _guard = InFlightGuard::enter(self.metrics.clone());
        let start = Instant::now();
        let result = next.next(request).await;
        let elapsed = start.elapsed();

        let size_labels = self.metrics.size_labels(&method, &host);
        self.metrics
            .duration
            .with_label_values(&size_labels)
            .observe(elapsed.as_secs_f64());
        self.metrics
            .request_size
            .with_label_values(&size_labels)
            .observe(request_bytes as f64);

        match &result {
            Ok(response) => {
                let status = status_class(response.status().as_u16());
                self.metrics
                    .requests
                    .with_label_values(&self.metrics.request_labels(&method, &host, status))
                    .inc();
                self.metrics
                    .response_size
                    .with_label_values(&size_labels)
                    .observe(response.bytes().len() as f64);
            }
            Err(e) => {
                self.metrics
                    .requests
                    .with_label_values(&self.metrics.request_labels(&method, &host, "error"))
                    .inc();
                self.metrics
                    .errors
                    .with_label_values(&[e.kind().as_str()])
                    .inc();
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(200), "2xx");
        assert_eq!(status_class(304), "3xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
    }

    #[test]
    fn test_metrics_register_into_registry() {
        let config = MetricsConfig::default();
        let registry = config.registry.clone();
        let _metrics = HttpMetrics::new(&config).unwrap();

        let families = registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.name()).collect();
        assert!(names.contains(&"trestle_http_requests_in_flight"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let config = MetricsConfig::default();
        assert!(HttpMetrics::new(&config).is_ok());
        assert!(HttpMetrics::new(&config).is_err());
    }

    #[test]
    fn test_in_flight_guard_balances() {
        let config = MetricsConfig::default();
        let metrics = Arc::new(HttpMetrics::new(&config).unwrap());
        {
            let _guard = InFlightGuard::enter(metrics.clone());
            assert_eq!(metrics.in_flight.get(), 1);
        }
        assert_eq!(metrics.in_flight.get(), 0);
    }
}
