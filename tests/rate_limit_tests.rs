//! Rate limiter behaviour against a live mock server.

use std::time::{Duration, Instant};
use trestle::{ErrorKind, HttpClient, HttpClientConfig, RateLimitConfig};
use trestle_testing::{MockServer, ResponseTemplate};

fn limited_client(base_url: &str, limit: RateLimitConfig) -> HttpClient {
    HttpClient::new(
        HttpClientConfig::builder()
            .base_url(base_url)
            .rate_limit(limit)
            .build(),
    )
}

#[tokio::test]
async fn burst_passes_then_requests_wait() {
    let server = MockServer::start().await;
    server.on_get("/ping", ResponseTemplate::ok());

    let limit =
        RateLimitConfig::per_second(2.0, 2).with_wait(true, Duration::from_secs(1));
    let client = limited_client(&server.uri(), limit);

    let start = Instant::now();
    for _ in 0..4 {
        let response = client.get("/ping").send().await.unwrap();
        assert_eq!(response.status(), 200);
    }
    let elapsed = start.elapsed();

    // Two immediate from the burst, two delayed by roughly half a second each.
    assert_eq!(server.request_count(), 4);
    assert!(elapsed >= Duration::from_millis(900), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn fail_fast_when_waiting_disabled() {
    let server = MockServer::start().await;
    server.on_get("/ping", ResponseTemplate::ok());

    let limit = RateLimitConfig::per_second(0.5, 2).with_wait(false, Duration::ZERO);
    let client = limited_client(&server.uri(), limit);

    let mut successes = 0;
    let mut rate_limited = 0;
    for _ in 0..6 {
        match client.get("/ping").send().await {
            Ok(_) => successes += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::RateLimit);
                rate_limited += 1;
            }
        }
    }

    assert_eq!(successes, 2);
    assert_eq!(rate_limited, 4);
    assert_eq!(server.request_count(), 2);
}

#[tokio::test]
async fn pass_throughs_stay_under_the_ceiling() {
    let server = MockServer::start().await;
    server.on_get("/ping", ResponseTemplate::ok());

    let limit = RateLimitConfig::per_second(10.0, 5).with_wait(false, Duration::ZERO);
    let client = limited_client(&server.uri(), limit);

    let window = Duration::from_millis(400);
    let start = Instant::now();
    let mut successes = 0u64;
    while start.elapsed() < window {
        if client.get("/ping").send().await.is_ok() {
            successes += 1;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // burst + rate * window, with slack for timing jitter.
    let ceiling = 5 + 10 * (window.as_millis() as u64) / 1000 + 2;
    assert!(successes <= ceiling, "{successes} > {ceiling}");
    assert!(successes >= 5);
}

#[tokio::test]
async fn long_projected_wait_is_refused() {
    let server = MockServer::start().await;
    server.on_get("/ping", ResponseTemplate::ok());

    // One token per minute: the projected wait far exceeds max_wait.
    let limit = RateLimitConfig::per_second(1.0 / 60.0, 1)
        .with_wait(true, Duration::from_millis(100));
    let client = limited_client(&server.uri(), limit);

    client.get("/ping").send().await.unwrap();
    let err = client.get("/ping").send().await.unwrap_err();
    match err {
        trestle::HttpClientError::RateLimited { key, retry_after } => {
            assert_eq!(key, "global");
            assert!(retry_after > Duration::from_secs(10));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn per_host_buckets_are_independent() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    server_a.on_get("/ping", ResponseTemplate::ok());
    server_b.on_get("/ping", ResponseTemplate::ok());

    let limit = RateLimitConfig::per_second(0.5, 1)
        .with_per_host(true)
        .with_wait(false, Duration::ZERO);
    let client = HttpClient::new(HttpClientConfig::builder().rate_limit(limit).build());

    // Both servers listen on 127.0.0.1, so spend the host bucket once and
    // verify the limiter tracked the host key rather than a global one.
    let url_a = format!("{}/ping", server_a.uri());
    assert!(client.get(url_a.as_str()).send().await.is_ok());
    assert!(client.get(url_a.as_str()).send().await.is_err());
    assert_eq!(
        client.rate_limiter().unwrap().remaining("127.0.0.1"),
        0
    );
}
