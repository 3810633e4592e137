//! Middleware chain for the request pipeline.

use crate::transport::Transport;
use crate::{Response, Result};
use async_trait::async_trait;
use reqwest::Request;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-request overrides carried alongside the request through the chain.
///
/// Middlewares read these through [`MiddlewareChain::overrides`]; only the
/// terminal dispatch consumes the proxy and streaming flags.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    /// End-to-end deadline for this call.
    pub deadline: Option<Instant>,
    /// Effective end-to-end timeout, kept for error reporting.
    pub timeout: Option<Duration>,
    /// Route this request through a specific proxy.
    pub proxy: Option<url::Url>,
    /// Dispatch directly, bypassing any configured proxy.
    pub no_proxy: bool,
    /// Deliver the response body as a stream instead of materializing it.
    pub streaming: bool,
}

impl RequestOverrides {
    /// Time left until the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Middleware trait for processing requests and responses.
///
/// A middleware may short-circuit (return without calling `next`), mutate the
/// request before forwarding, or observe and transform the response on the
/// way out. Middlewares run on the calling task and must not retain body
/// references past return.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Process the request and call the next middleware.
    async fn handle(&self, request: Request, next: &MiddlewareChain) -> Result<Response>;
}

/// Chain of middleware handlers terminating at the transport dispatch.
///
/// Built once per client at configuration time; per request it is invoked
/// with that request's overrides and walked outer to inner by index.
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
    transport: Transport,
    overrides: RequestOverrides,
    index: usize,
}

impl MiddlewareChain {
    /// Create a new middleware chain.
    pub(crate) fn new(transport: Transport) -> Self {
        Self {
            middlewares: Vec::new(),
            transport,
            overrides: RequestOverrides::default(),
            index: 0,
        }
    }

    /// Append a middleware; the first added runs outermost.
    pub(crate) fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// The overrides of the in-flight request.
    pub fn overrides(&self) -> &RequestOverrides {
        &self.overrides
    }

    /// Execute the request through the middleware chain.
    pub(crate) async fn execute(
        &self,
        request: Request,
        overrides: RequestOverrides,
    ) -> Result<Response> {
        let chain = MiddlewareChain {
            middlewares: self.middlewares.clone(),
            transport: self.transport.clone(),
            overrides,
            index: 0,
        };
        chain.execute_at(0, request).await
    }

    /// Execute starting at a specific index.
    async fn execute_at(&self, index: usize, request: Request) -> Result<Response> {
        if index >= self.middlewares.len() {
            // End of chain, dispatch on the transport
            self.transport.dispatch(request, &self.overrides).await
        } else {
            let next = MiddlewareChain {
                middlewares: self.middlewares.clone(),
                transport: self.transport.clone(),
                overrides: self.overrides.clone(),
                index: index + 1,
            };
            self.middlewares[index].handle(request, &next).await
        }
    }

    /// Continue to the next middleware.
    pub async fn next(&self, request: Request) -> Result<Response> {
        self.execute_at(self.index, request).await
    }
}

/// Clone a request, preserving buffered bodies.
///
/// Returns `None` when the body is a stream and cannot be replayed.
pub(crate) fn clone_request(request: &Request) -> Option<Request> {
    let mut clone = Request::new(request.method().clone(), request.url().clone());
    *clone.headers_mut() = request.headers().clone();
    *clone.version_mut() = request.version();
    *clone.timeout_mut() = request.timeout().copied();

    if let Some(body) = request.body() {
        let bytes = body.as_bytes()?;
        *clone.body_mut() = Some(bytes.to_vec().into());
    }

    Some(clone)
}

/// Deadline middleware enforcing the end-to-end timeout.
///
/// The shorter of the client default and any per-request timeout was already
/// folded into the overrides' deadline by the request builder.
pub struct TimeoutMiddleware;

#[async_trait]
impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    async fn handle(&self, request: Request, next: &MiddlewareChain) -> Result<Response> {
        let Some(deadline) = next.overrides().deadline else {
            return next.next(request).await;
        };
        let timeout = next.overrides().timeout.unwrap_or_default();

        match tokio::time::timeout_at(deadline.into(), next.next(request)).await {
            Ok(result) => result,
            Err(_) => Err(crate::HttpClientError::Timeout(timeout)),
        }
    }
}

/// Logging middleware emitting structured request/response events.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, request: Request, next: &MiddlewareChain) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let start = Instant::now();
        let result = next.next(request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::debug!(
                    method = %method,
                    url = %url,
                    status = %response.status(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Received HTTP response"
                );
            }
            Err(e) => {
                tracing::warn!(
                    method = %method,
                    url = %url,
                    error = %e,
                    kind = %e.kind(),
                    duration_ms = elapsed.as_millis() as u64,
                    "HTTP request failed"
                );
            }
        }

        result
    }
}

/// Request ID middleware that adds a unique ID to each request.
pub struct RequestIdMiddleware {
    header_name: http::header::HeaderName,
}

impl RequestIdMiddleware {
    /// Create a new request ID middleware using `X-Request-ID`.
    pub fn new() -> Self {
        Self {
            header_name: http::header::HeaderName::from_static("x-request-id"),
        }
    }

    /// Create with a custom header name.
    pub fn with_header(header: impl AsRef<str>) -> Self {
        Self {
            header_name: http::header::HeaderName::from_bytes(header.as_ref().as_bytes())
                .unwrap_or_else(|_| http::header::HeaderName::from_static("x-request-id")),
        }
    }
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request-id"
    }

    async fn handle(&self, mut request: Request, next: &MiddlewareChain) -> Result<Response> {
        let request_id = format!(
            "{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );

        if let Ok(value) = request_id.parse() {
            request.headers_mut().insert(self.header_name.clone(), value);
        }

        next.next(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_clone_request_preserves_body() {
        let mut request = Request::new(
            Method::POST,
            url::Url::parse("https://example.com/items").unwrap(),
        );
        request
            .headers_mut()
            .insert("x-test", "1".parse().unwrap());
        *request.body_mut() = Some(b"payload".to_vec().into());

        let clone = clone_request(&request).unwrap();
        assert_eq!(clone.method(), &Method::POST);
        assert_eq!(clone.headers().get("x-test").unwrap(), "1");
        assert_eq!(clone.body().unwrap().as_bytes().unwrap(), b"payload");
    }

    #[test]
    fn test_overrides_remaining() {
        let overrides = RequestOverrides {
            deadline: Some(Instant::now() + Duration::from_secs(5)),
            ..Default::default()
        };
        let remaining = overrides.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_secs(4));
    }
}
