//! Compression behaviour against a live mock server.

use trestle::{CompressionConfig, Encoding, HttpClient, HttpClientConfig};
use trestle_testing::{MockServer, ResponseTemplate};

fn compressed_client(base_url: &str) -> HttpClient {
    HttpClient::new(
        HttpClientConfig::builder()
            .base_url(base_url)
            .default_compression()
            .build(),
    )
}

#[tokio::test]
async fn large_request_bodies_are_gzipped() {
    let server = MockServer::start().await;
    server.on_post("/ingest", ResponseTemplate::new(202));

    let payload = serde_json::json!({
        "records": vec!["sample record payload"; 200],
    });
    let expected = serde_json::to_vec(&payload).unwrap();

    let client = compressed_client(&server.uri());
    let response = client.post("/ingest").json(&payload).send().await.unwrap();
    assert_eq!(response.status(), 202);

    let recorded = &server.received_requests()[0];
    assert_eq!(recorded.header("content-encoding"), Some("gzip"));
    assert!(recorded.body.len() < expected.len());
    assert_eq!(Encoding::Gzip.decompress(&recorded.body).unwrap(), expected);
}

#[tokio::test]
async fn small_request_bodies_are_left_alone() {
    let server = MockServer::start().await;
    server.on_post("/ingest", ResponseTemplate::new(202));

    let client = compressed_client(&server.uri());
    client
        .post("/ingest")
        .json(&serde_json::json!({"one": 1}))
        .send()
        .await
        .unwrap();

    let recorded = &server.received_requests()[0];
    assert_eq!(recorded.header("content-encoding"), None);
    assert_eq!(recorded.body_json().unwrap()["one"], 1);
}

#[tokio::test]
async fn accept_encoding_is_advertised() {
    let server = MockServer::start().await;
    server.on_get("/resource", ResponseTemplate::ok());

    let client = compressed_client(&server.uri());
    client.get("/resource").send().await.unwrap();

    let recorded = &server.received_requests()[0];
    assert_eq!(recorded.header("accept-encoding"), Some("gzip, deflate"));
}

#[tokio::test]
async fn gzipped_responses_are_decoded_transparently() {
    let original = b"response payload that the server compressed".repeat(20);
    let compressed = Encoding::Gzip.compress(&original, 6).unwrap();

    let server = MockServer::start().await;
    server.on_get(
        "/archive",
        ResponseTemplate::ok()
            .append_header("Content-Encoding", "gzip")
            .set_body_bytes(compressed),
    );

    let client = compressed_client(&server.uri());
    let response = client.get("/archive").send().await.unwrap();

    assert_eq!(response.header("content-encoding"), None);
    assert_eq!(response.bytes().as_ref(), original.as_slice());
}

#[tokio::test]
async fn deflate_responses_are_decoded_transparently() {
    let original = b"deflate encoded payload".repeat(20);
    let compressed = Encoding::Deflate.compress(&original, 6).unwrap();

    let server = MockServer::start().await;
    server.on_get(
        "/archive",
        ResponseTemplate::ok()
            .append_header("Content-Encoding", "deflate")
            .set_body_bytes(compressed),
    );

    let client = compressed_client(&server.uri());
    let response = client.get("/archive").send().await.unwrap();

    assert_eq!(response.header("content-encoding"), None);
    assert_eq!(response.bytes().as_ref(), original.as_slice());
}

#[tokio::test]
async fn unknown_encodings_pass_through() {
    let server = MockServer::start().await;
    server.on_get(
        "/exotic",
        ResponseTemplate::ok()
            .append_header("Content-Encoding", "br")
            .set_body_string("raw brotli bytes"),
    );

    let client = compressed_client(&server.uri());
    let response = client.get("/exotic").send().await.unwrap();

    assert_eq!(response.header("content-encoding"), Some("br"));
    assert_eq!(response.text().unwrap(), "raw brotli bytes");
}

#[tokio::test]
async fn request_compression_can_be_disabled() {
    let server = MockServer::start().await;
    server.on_post("/ingest", ResponseTemplate::new(202));

    let compression = CompressionConfig::default().with_request(false);
    let client = HttpClient::new(
        HttpClientConfig::builder()
            .base_url(server.uri())
            .compression(compression)
            .build(),
    );

    let payload = serde_json::json!({"records": vec!["data"; 500]});
    client.post("/ingest").json(&payload).send().await.unwrap();

    let recorded = &server.received_requests()[0];
    assert_eq!(recorded.header("content-encoding"), None);
}
