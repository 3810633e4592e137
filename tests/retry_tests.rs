//! Retry behaviour against a live mock server.

use std::time::{Duration, Instant};
use trestle::{BackoffStrategy, ErrorKind, HttpClient, HttpClientConfig, RetryConfig};
use trestle_testing::{exact_path, FlakyResponder, MockServer, ResponseTemplate};

fn client_with_retry(base_url: &str, retry: RetryConfig) -> HttpClient {
    HttpClient::new(
        HttpClientConfig::builder()
            .base_url(base_url)
            .retry(retry)
            .build(),
    )
}

#[tokio::test]
async fn recovers_after_transient_failures() {
    let server = MockServer::start().await;
    server.mock_responder(
        exact_path("/orders"),
        FlakyResponder::failing(
            2,
            ResponseTemplate::ok().set_body_json(&serde_json::json!({"ok": true})),
        ),
    );

    let client = client_with_retry(&server.uri(), RetryConfig::default());
    let response = client.get("/orders").send().await.unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(server.request_count(), 3);
}

#[tokio::test]
async fn attempts_never_exceed_max() {
    let server = MockServer::start().await;
    server.on_get("/always-broken", ResponseTemplate::internal_server_error());

    let retry = RetryConfig::fixed(3, Duration::from_millis(5));
    let client = client_with_retry(&server.uri(), retry);
    let response = client.get("/always-broken").send().await.unwrap();

    // Exhausted retries surface the last response.
    assert_eq!(response.status(), 500);
    assert_eq!(server.request_count(), 3);
}

#[tokio::test]
async fn non_retryable_status_is_returned_immediately() {
    let server = MockServer::start().await;
    server.on_get("/missing", ResponseTemplate::not_found());

    let client = client_with_retry(&server.uri(), RetryConfig::fixed(3, Duration::from_millis(5)));
    let response = client.get("/missing").send().await.unwrap();

    assert_eq!(response.status(), 404);
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn custom_predicate_replaces_default_decision() {
    let server = MockServer::start().await;
    server.on_get("/teapot", ResponseTemplate::new(418).set_body_string("short and stout"));

    let retry = RetryConfig::fixed(3, Duration::from_millis(5)).with_predicate(|_, _, response| {
        response.map(|r| r.status().as_u16() == 418).unwrap_or(false)
    });
    let client = client_with_retry(&server.uri(), retry);
    let response = client.get("/teapot").send().await.unwrap();

    assert_eq!(response.status(), 418);
    assert_eq!(server.request_count(), 3);
}

#[tokio::test]
async fn connection_errors_are_retryable() {
    // Nothing listens on this port.
    let client = client_with_retry(
        "http://127.0.0.1:9",
        RetryConfig::fixed(2, Duration::from_millis(5)),
    );
    let err = client.get("/unreachable").send().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn backoff_that_overshoots_deadline_returns_last_result() {
    let server = MockServer::start().await;
    server.on_get("/broken", ResponseTemplate::internal_server_error());

    let retry = RetryConfig::fixed(3, Duration::from_secs(5));
    let client = client_with_retry(&server.uri(), retry);

    let start = Instant::now();
    let response = client
        .get("/broken")
        .timeout(Duration::from_millis(300))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn dropping_the_call_cancels_backoff_promptly() {
    let server = MockServer::start().await;
    server.on_get("/broken", ResponseTemplate::internal_server_error());

    let retry = RetryConfig::default().with_backoff(BackoffStrategy::Fixed(Duration::from_secs(30)));
    // A deadline far beyond the backoff, so the loop really sleeps.
    let client = HttpClient::new(
        HttpClientConfig::builder()
            .base_url(server.uri())
            .timeout(Duration::from_secs(300))
            .retry(retry)
            .build(),
    );

    let start = Instant::now();
    let result =
        tokio::time::timeout(Duration::from_millis(100), client.get("/broken").send()).await;

    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn slow_responses_hit_the_deadline() {
    let server = MockServer::start().await;
    server.on_get("/slow", ResponseTemplate::slow(Duration::from_secs(2)));

    let client = HttpClient::new(HttpClientConfig::builder().base_url(server.uri()).build());
    let start = Instant::now();
    let err = client
        .get("/slow")
        .timeout(Duration::from_millis(100))
        .send()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(start.elapsed() < Duration::from_secs(1));
}
