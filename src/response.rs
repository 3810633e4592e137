//! HTTP response wrapper.

use crate::{HttpClientError, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

static EMPTY_BODY: Bytes = Bytes::new();

/// Response body representation.
///
/// Materialized bodies are shared-immutable byte buffers; streaming bodies
/// hold the live transport response and must be drained via [`Response::chunk`].
#[derive(Debug)]
enum ResponseBody {
    Full(Bytes),
    Stream(reqwest::Response),
}

/// HTTP response wrapper.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: url::Url,
    body: ResponseBody,
}

impl Response {
    /// Create a response from a reqwest response, materializing the body.
    pub(crate) async fn from_reqwest(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        Ok(Self {
            status,
            headers,
            url,
            body: ResponseBody::Full(body),
        })
    }

    /// Create a response that streams its body from the transport.
    pub(crate) fn from_reqwest_streaming(response: reqwest::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();

        Self {
            status,
            headers,
            url,
            body: ResponseBody::Stream(response),
        }
    }

    /// Assemble a response from stored parts (cache hits).
    pub(crate) fn from_parts(
        status: StatusCode,
        headers: HeaderMap,
        url: url::Url,
        body: Bytes,
    ) -> Self {
        Self {
            status,
            headers,
            url,
            body: ResponseBody::Full(body),
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response was a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response was a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the response headers.
    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response URL.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Whether the body is delivered as a stream.
    ///
    /// Streaming responses must be consumed with [`Response::chunk`]; the
    /// accessor methods below see an empty buffer.
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Stream(_))
    }

    /// Get the materialized response body.
    ///
    /// Empty for streaming responses.
    pub fn bytes(&self) -> &Bytes {
        match &self.body {
            ResponseBody::Full(b) => b,
            ResponseBody::Stream(_) => &EMPTY_BODY,
        }
    }

    /// Replace the materialized body (response decoding).
    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = ResponseBody::Full(body);
    }

    /// Read the next body chunk of a streaming response.
    ///
    /// Returns `Ok(None)` once the body is exhausted. Dropping the response
    /// mid-stream closes the underlying transport stream. For materialized
    /// bodies the whole buffer is yielded as a single chunk.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        match &mut self.body {
            ResponseBody::Stream(inner) => Ok(inner.chunk().await?),
            ResponseBody::Full(b) => {
                if b.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(std::mem::take(b)))
                }
            }
        }
    }

    /// Consume the response and return the body as bytes, draining a stream
    /// if necessary.
    pub async fn into_bytes(self) -> Result<Bytes> {
        match self.body {
            ResponseBody::Full(b) => Ok(b),
            ResponseBody::Stream(inner) => Ok(inner.bytes().await?),
        }
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.bytes().to_vec()).map_err(|e| HttpClientError::Json(e.to_string()))
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(self.bytes()).map_err(|e| HttpClientError::Json(e.to_string()))
    }

    /// Get the content length if available.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Check for an error response and return it.
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            let message = self.text().unwrap_or_else(|_| "Unknown error".to_string());
            Err(HttpClientError::Response {
                status: self.status.as_u16(),
                message,
            })
        } else {
            Ok(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(status: u16, body: &str) -> Response {
        Response::from_parts(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            url::Url::parse("https://example.com/").unwrap(),
            Bytes::copy_from_slice(body.as_bytes()),
        )
    }

    #[test]
    fn test_status_predicates() {
        assert!(response_with(200, "").is_success());
        assert!(response_with(404, "").is_client_error());
        assert!(response_with(503, "").is_server_error());
    }

    #[test]
    fn test_json_decode() {
        let resp = response_with(200, r#"{"id":7}"#);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_error_for_status() {
        assert!(response_with(204, "").error_for_status().is_ok());
        let err = response_with(404, "missing").error_for_status().unwrap_err();
        assert_eq!(err.status_code(), Some(404));
    }

    #[tokio::test]
    async fn test_full_body_single_chunk() {
        let mut resp = response_with(200, "hello");
        assert_eq!(resp.chunk().await.unwrap().unwrap(), Bytes::from("hello"));
        assert!(resp.chunk().await.unwrap().is_none());
    }
}
