//! Response templates and responders.

use crate::RecordedRequest;
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fluent response description served by a registration.
#[derive(Debug, Clone)]
pub struct ResponseTemplate {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    delay: Option<Duration>,
}

impl ResponseTemplate {
    /// Create a template with the given status and empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            delay: None,
        }
    }

    /// 200 OK.
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// A 200 response delivered after the given delay.
    pub fn slow(delay: Duration) -> Self {
        Self::ok().set_delay(delay)
    }

    fn error(status: u16, message: &str) -> Self {
        Self::new(status).set_body_json(&serde_json::json!({
            "error": message,
            "status": status,
        }))
    }

    /// 400 Bad Request with a standard JSON body.
    pub fn bad_request() -> Self {
        Self::error(400, "Bad Request")
    }

    /// 401 Unauthorized with a standard JSON body.
    pub fn unauthorized() -> Self {
        Self::error(401, "Unauthorized")
    }

    /// 403 Forbidden with a standard JSON body.
    pub fn forbidden() -> Self {
        Self::error(403, "Forbidden")
    }

    /// 404 Not Found with a standard JSON body.
    pub fn not_found() -> Self {
        Self::error(404, "Not Found")
    }

    /// 405 Method Not Allowed with a standard JSON body.
    pub fn method_not_allowed() -> Self {
        Self::error(405, "Method Not Allowed")
    }

    /// 429 Too Many Requests with a `Retry-After` header.
    pub fn too_many_requests(retry_after: Duration) -> Self {
        Self::error(429, "Too Many Requests")
            .append_header("Retry-After", retry_after.as_secs().to_string())
    }

    /// 500 Internal Server Error with a standard JSON body.
    pub fn internal_server_error() -> Self {
        Self::error(500, "Internal Server Error")
    }

    /// 502 Bad Gateway with a standard JSON body.
    pub fn bad_gateway() -> Self {
        Self::error(502, "Bad Gateway")
    }

    /// 503 Service Unavailable with a `Retry-After` header.
    pub fn service_unavailable(retry_after: Duration) -> Self {
        Self::error(503, "Service Unavailable")
            .append_header("Retry-After", retry_after.as_secs().to_string())
    }

    /// 504 Gateway Timeout with a standard JSON body.
    pub fn gateway_timeout() -> Self {
        Self::error(504, "Gateway Timeout")
    }

    /// Append a header.
    pub fn append_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body from raw bytes.
    pub fn set_body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a text body.
    pub fn set_body_string(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Set a JSON body and the matching content type.
    pub fn set_body_json<T: Serialize>(mut self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.body = Bytes::from(bytes);
                self.headers
                    .push(("Content-Type".to_string(), "application/json".to_string()));
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize mock JSON body"),
        }
        self
    }

    /// Delay the response by the given duration.
    pub fn set_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Response status.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Artificial delay, if any.
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }
}

/// Produces a response for each matched request.
pub trait Responder: Send + Sync {
    /// Build the response for this request.
    fn respond(&self, request: &RecordedRequest) -> ResponseTemplate;
}

impl Responder for ResponseTemplate {
    fn respond(&self, _request: &RecordedRequest) -> ResponseTemplate {
        self.clone()
    }
}

/// Serves templates in order; the last one repeats once the sequence is
/// exhausted.
pub struct SequenceResponder {
    templates: Vec<ResponseTemplate>,
    position: AtomicUsize,
}

impl SequenceResponder {
    /// Create a sequence responder. Falls back to 404 when empty.
    pub fn new(templates: Vec<ResponseTemplate>) -> Self {
        Self {
            templates,
            position: AtomicUsize::new(0),
        }
    }
}

impl Responder for SequenceResponder {
    fn respond(&self, _request: &RecordedRequest) -> ResponseTemplate {
        if self.templates.is_empty() {
            return ResponseTemplate::not_found();
        }
        let position = self.position.fetch_add(1, Ordering::SeqCst);
        self.templates[position.min(self.templates.len() - 1)].clone()
    }
}

/// Interleaves failures and successes in a fixed, repeating cadence.
///
/// Each cycle serves `failures` failure responses followed by `successes`
/// success responses; the counter advances one slot per matched request.
pub struct FlakyResponder {
    failures: usize,
    successes: usize,
    failure: ResponseTemplate,
    success: ResponseTemplate,
    counter: AtomicUsize,
}

impl FlakyResponder {
    /// Create a flaky responder with explicit templates.
    pub fn new(
        failures: u32,
        successes: u32,
        failure: ResponseTemplate,
        success: ResponseTemplate,
    ) -> Self {
        Self {
            failures: failures as usize,
            successes: (successes as usize).max(1),
            failure,
            success,
            counter: AtomicUsize::new(0),
        }
    }

    /// Fail `failures` times with 500, then serve the given success.
    pub fn failing(failures: u32, success: ResponseTemplate) -> Self {
        Self::new(
            failures,
            1,
            ResponseTemplate::internal_server_error(),
            success,
        )
    }

    /// Requests observed so far.
    pub fn calls(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Responder for FlakyResponder {
    fn respond(&self, _request: &RecordedRequest) -> ResponseTemplate {
        let position = self.counter.fetch_add(1, Ordering::SeqCst);
        let cycle = self.failures + self.successes;
        if position % cycle < self.failures {
            self.failure.clone()
        } else {
            self.success.clone()
        }
    }
}
