//! Mock server behaviour over a real socket.

use std::time::{Duration, Instant};
use trestle_testing::{
    exact_path, has_query_param, method_is, FlakyResponder, MatcherExt, MockServer,
    ResponseTemplate, SequenceResponder,
};

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("failed to build test client")
}

#[tokio::test]
async fn serves_registered_response() {
    let server = MockServer::start().await;
    server.on_get(
        "/users/1",
        ResponseTemplate::ok().set_body_json(&serde_json::json!({"id": 1})),
    );

    let response = http_client()
        .get(format!("{}/users/1", server.uri()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], 1);
}

#[tokio::test]
async fn unmatched_requests_get_404() {
    let server = MockServer::start().await;
    server.on_get("/known", ResponseTemplate::ok());

    let response = http_client()
        .get(format!("{}/unknown", server.uri()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn first_matching_registration_wins() {
    let server = MockServer::start().await;
    server.mock(
        method_is("GET").and(exact_path("/a")),
        ResponseTemplate::ok().set_body_string("specific"),
    );
    server.mock(
        method_is("GET"),
        ResponseTemplate::ok().set_body_string("fallback"),
    );

    let body = http_client()
        .get(format!("{}/a", server.uri()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "specific");

    let body = http_client()
        .get(format!("{}/b", server.uri()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "fallback");
}

#[tokio::test]
async fn records_requests_in_arrival_order() {
    let server = MockServer::start().await;
    server.on_get("/a", ResponseTemplate::ok().set_body_string("A"));
    server.on_post("/a", ResponseTemplate::new(201).set_body_string("B"));

    let client = http_client();
    let first = client
        .get(format!("{}/a", server.uri()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let second = client
        .post(format!("{}/a", server.uri()))
        .body("payload")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let third = client
        .get(format!("{}/a", server.uri()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!((first.as_str(), second.as_str(), third.as_str()), ("A", "B", "A"));

    let recorded = server.received_requests();
    let sequence: Vec<(String, String)> = recorded
        .iter()
        .map(|r| (r.method.clone(), r.path.clone()))
        .collect();
    assert_eq!(
        sequence,
        vec![
            ("GET".to_string(), "/a".to_string()),
            ("POST".to_string(), "/a".to_string()),
            ("GET".to_string(), "/a".to_string()),
        ]
    );
    assert_eq!(recorded[1].body_string(), "payload");
    assert_eq!(recorded.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[tokio::test]
async fn query_params_are_recorded_and_matchable() {
    let server = MockServer::start().await;
    server.mock(
        exact_path("/search").and(has_query_param("q", "widgets")),
        ResponseTemplate::ok().set_body_string("found"),
    );

    let client = http_client();
    let hit = client
        .get(format!("{}/search?q=widgets&page=2", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(hit.status(), 200);

    let miss = client
        .get(format!("{}/search?q=other", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(miss.status(), 404);

    let recorded = server.requests_for("/search");
    assert_eq!(recorded[0].query_param("page"), Some("2"));
}

#[tokio::test]
async fn delayed_responses_wait() {
    let server = MockServer::start().await;
    server.on_get(
        "/slow",
        ResponseTemplate::slow(Duration::from_millis(150)).set_body_string("eventually"),
    );

    let start = Instant::now();
    let response = http_client()
        .get(format!("{}/slow", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(start.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn flaky_responder_follows_cadence() {
    let server = MockServer::start().await;
    server.mock_responder(
        exact_path("/flaky"),
        FlakyResponder::failing(2, ResponseTemplate::ok().set_body_json(&serde_json::json!({"ok": true}))),
    );

    let client = http_client();
    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = client
            .get(format!("{}/flaky", server.uri()))
            .send()
            .await
            .unwrap();
        statuses.push(response.status().as_u16());
    }
    assert_eq!(statuses, vec![500, 500, 200]);
}

#[tokio::test]
async fn sequence_responder_serves_in_order() {
    let server = MockServer::start().await;
    server.mock_responder(
        exact_path("/versions"),
        SequenceResponder::new(vec![
            ResponseTemplate::ok().set_body_string("v1"),
            ResponseTemplate::ok().set_body_string("v2"),
        ]),
    );

    let client = http_client();
    let mut bodies = Vec::new();
    for _ in 0..3 {
        bodies.push(
            client
                .get(format!("{}/versions", server.uri()))
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap(),
        );
    }
    assert_eq!(bodies, vec!["v1", "v2", "v2"]);
}

#[tokio::test]
async fn retry_after_header_is_served() {
    let server = MockServer::start().await;
    server.on_get(
        "/busy",
        ResponseTemplate::too_many_requests(Duration::from_secs(3)),
    );

    let response = http_client()
        .get(format!("{}/busy", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
    assert_eq!(response.headers().get("retry-after").unwrap(), "3");
}

#[tokio::test]
async fn reset_clears_mounts_and_log() {
    let server = MockServer::start().await;
    server.on_get("/a", ResponseTemplate::ok());

    let client = http_client();
    client
        .get(format!("{}/a", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(server.request_count(), 1);

    server.reset();
    assert_eq!(server.request_count(), 0);

    let response = client
        .get(format!("{}/a", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
