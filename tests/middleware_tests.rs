//! Middleware composition and ordering.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use trestle::{
    HttpClient, HttpClientConfig, Middleware, MiddlewareChain, RequestIdMiddleware, Response,
    Result,
};
use trestle_testing::{MockServer, ResponseTemplate};

/// Appends enter/exit markers to a shared log.
struct TracerMiddleware {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Middleware for TracerMiddleware {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn handle(&self, request: reqwest::Request, next: &MiddlewareChain) -> Result<Response> {
        self.log.lock().push(format!("enter {}", self.label));
        let result = next.next(request).await;
        self.log.lock().push(format!("exit {}", self.label));
        result
    }
}

/// Short-circuits every request with a canned response.
struct ShortCircuitMiddleware;

#[async_trait]
impl Middleware for ShortCircuitMiddleware {
    fn name(&self) -> &'static str {
        "short-circuit"
    }

    async fn handle(
        &self,
        request: reqwest::Request,
        _next: &MiddlewareChain,
    ) -> Result<Response> {
        let _ = request;
        Err(trestle::HttpClientError::RequestBuild(
            "stopped before dispatch".to_string(),
        ))
    }
}

#[tokio::test]
async fn middlewares_run_outer_to_inner_and_unwind() {
    let server = MockServer::start().await;
    server.on_get("/trace", ResponseTemplate::ok());

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .middleware(TracerMiddleware {
            label: "m1",
            log: log.clone(),
        })
        .middleware(TracerMiddleware {
            label: "m2",
            log: log.clone(),
        })
        .middleware(TracerMiddleware {
            label: "m3",
            log: log.clone(),
        })
        .build();
    let client = HttpClient::new(config);

    client.get("/trace").send().await.unwrap();

    let recorded = log.lock().clone();
    assert_eq!(
        recorded,
        vec![
            "enter m1", "enter m2", "enter m3", "exit m3", "exit m2", "exit m1",
        ]
    );
}

#[tokio::test]
async fn short_circuit_never_reaches_the_transport() {
    let server = MockServer::start().await;
    server.on_get("/never", ResponseTemplate::ok());

    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .middleware(ShortCircuitMiddleware)
        .build();
    let client = HttpClient::new(config);

    let err = client.get("/never").send().await.unwrap_err();
    assert!(matches!(err, trestle::HttpClientError::RequestBuild(_)));
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn request_id_middleware_stamps_outbound_requests() {
    let server = MockServer::start().await;
    server.on_get("/tagged", ResponseTemplate::ok());

    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .middleware(RequestIdMiddleware::new())
        .build();
    let client = HttpClient::new(config);

    client.get("/tagged").send().await.unwrap();
    client.get("/tagged").send().await.unwrap();

    let recorded = server.received_requests();
    let first = recorded[0].header("x-request-id").unwrap().to_string();
    let second = recorded[1].header("x-request-id").unwrap().to_string();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[tokio::test]
async fn default_headers_and_auth_are_applied() {
    let server = MockServer::start().await;
    server.on_get("/whoami", ResponseTemplate::ok());

    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .default_header("X-Service", "billing")
        .basic_auth("user", "secret")
        .build();
    let client = HttpClient::new(config);

    client.get("/whoami").send().await.unwrap();
    // A per-request Authorization wins over the configured credentials.
    client
        .get("/whoami")
        .bearer_auth("token123")
        .send()
        .await
        .unwrap();

    let recorded = server.received_requests();
    assert_eq!(recorded[0].header("x-service"), Some("billing"));
    assert_eq!(
        recorded[0].header("authorization"),
        Some("Basic dXNlcjpzZWNyZXQ=")
    );
    assert_eq!(recorded[1].header("authorization"), Some("Bearer token123"));
}

#[tokio::test]
async fn error_for_status_surfaces_client_errors() {
    let server = MockServer::start().await;
    server.on_get("/missing", ResponseTemplate::not_found());

    let lenient = HttpClient::new(HttpClientConfig::builder().base_url(server.uri()).build());
    let response = lenient.get("/missing").send().await.unwrap();
    assert_eq!(response.status(), 404);

    let strict = HttpClient::new(
        HttpClientConfig::builder()
            .base_url(server.uri())
            .error_for_status(true)
            .build(),
    );
    let err = strict.get("/missing").send().await.unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.kind(), trestle::ErrorKind::Client);
}

#[tokio::test]
async fn streaming_responses_deliver_chunks() {
    let server = MockServer::start().await;
    server.on_get(
        "/stream",
        ResponseTemplate::ok().set_body_string("streamed payload"),
    );

    let client = HttpClient::new(HttpClientConfig::builder().base_url(server.uri()).build());
    let mut response = client.get("/stream").streaming().send().await.unwrap();

    assert!(response.is_streaming());
    let mut collected = Vec::new();
    while let Some(chunk) = response.chunk().await.unwrap() {
        collected.extend_from_slice(&chunk);
    }
    assert_eq!(collected, b"streamed payload");
}
