//! Programmable mock HTTP server.

use crate::matchers::{exact_path, method_is, Matcher, MatcherExt};
use crate::response::{Responder, ResponseTemplate};
use crate::RecordedRequest;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::debug;

struct Mount {
    matcher: Box<dyn Matcher>,
    responder: Box<dyn Responder>,
}

#[derive(Default)]
struct ServerState {
    mounts: RwLock<Vec<Mount>>,
    recorded: RwLock<Vec<RecordedRequest>>,
}

/// Programmable HTTP server for tests.
///
/// Registrations are `(matcher, responder)` pairs; each incoming request is
/// recorded, then answered by the first matching registration, or 404. All
/// state is safe for concurrent access. The server binds an OS-assigned
/// loopback port and shuts down when dropped.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Bind and start serving on an OS-assigned port.
    ///
    /// # Panics
    ///
    /// Panics when the loopback listener cannot be bound; mock servers are
    /// started in test setup where that is fatal anyway.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server listener");
        let addr = listener
            .local_addr()
            .expect("failed to read mock server address");

        let state = Arc::new(ServerState::default());
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let io = TokioIo::new(stream);
                        let state = accept_state.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(state, req).await }
                            });
                            if let Err(e) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                debug!(error = %e, "Mock server connection closed with error");
                            }
                        });
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        Self {
            addr,
            state,
            shutdown,
            handle,
        }
    }

    /// Base URI of the server, e.g. `http://127.0.0.1:4096`.
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Socket address the server is bound to.
    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    /// Register a matcher with a fixed response template.
    pub fn mock(&self, matcher: impl Matcher + 'static, template: ResponseTemplate) {
        self.mock_responder(matcher, template);
    }

    /// Register a matcher with a stateful responder.
    pub fn mock_responder(&self, matcher: impl Matcher + 'static, responder: impl Responder + 'static) {
        self.state.mounts.write().push(Mount {
            matcher: Box::new(matcher),
            responder: Box::new(responder),
        });
    }

    /// Register a response for `GET path`.
    pub fn on_get(&self, path: impl Into<String>, template: ResponseTemplate) {
        self.mock(method_is("GET").and(exact_path(path)), template);
    }

    /// Register a response for `POST path`.
    pub fn on_post(&self, path: impl Into<String>, template: ResponseTemplate) {
        self.mock(method_is("POST").and(exact_path(path)), template);
    }

    /// Register a response for `PUT path`.
    pub fn on_put(&self, path: impl Into<String>, template: ResponseTemplate) {
        self.mock(method_is("PUT").and(exact_path(path)), template);
    }

    /// Register a response for `DELETE path`.
    pub fn on_delete(&self, path: impl Into<String>, template: ResponseTemplate) {
        self.mock(method_is("DELETE").and(exact_path(path)), template);
    }

    /// All requests received so far, in arrival order.
    pub fn received_requests(&self) -> Vec<RecordedRequest> {
        self.state.recorded.read().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.state.recorded.read().len()
    }

    /// Requests received for a given path, in arrival order.
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.state
            .recorded
            .read()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Drop all registrations and recorded requests.
    pub fn reset(&self) {
        self.state.mounts.write().clear();
        self.state.recorded.write().clear();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}

async fn handle_request(
    state: Arc<ServerState>,
    request: hyper::Request<hyper::body::Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let method = request.method().to_string();
    let uri = request.uri().clone();
    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    let body = request
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    let query: Vec<(String, String)> = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    let recorded = {
        let mut log = state.recorded.write();
        let recorded = RecordedRequest {
            method,
            path: uri.path().to_string(),
            query,
            headers,
            body,
            index: log.len(),
        };
        log.push(recorded.clone());
        recorded
    };

    let template = {
        let mounts = state.mounts.read();
        mounts
            .iter()
            .find(|mount| mount.matcher.matches(&recorded))
            .map(|mount| mount.responder.respond(&recorded))
            .unwrap_or_else(ResponseTemplate::not_found)
    };

    if let Some(delay) = template.delay() {
        tokio::time::sleep(delay).await;
    }

    let mut builder = hyper::Response::builder().status(template.status());
    for (name, value) in template.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    Ok(builder
        .body(Full::new(template.body().clone()))
        .unwrap_or_else(|_| hyper::Response::new(Full::new(Bytes::new()))))
}
