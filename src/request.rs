//! Request builder.

use crate::middleware::RequestOverrides;
use crate::{HttpClient, HttpClientError, Response, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::{Duration, Instant};

/// HTTP request builder.
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    method: Method,
    url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    timeout: Option<Duration>,
    proxy: Option<url::Url>,
    no_proxy: bool,
    streaming: bool,
}

impl<'a> RequestBuilder<'a> {
    /// Create a new request builder.
    pub(crate) fn new(client: &'a HttpClient, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
            proxy: None,
            no_proxy: false,
            streaming: false,
        }
    }

    /// Add a header to the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.query.push((k.into(), v.into()));
        }
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the request body as text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = Some(text.into_bytes());
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => {
                self.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                self.body = Some(bytes);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON body");
            }
        }
        self
    }

    /// Set the request body as form data.
    pub fn form<T: Serialize>(mut self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => {
                self.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                self.body = Some(encoded.into_bytes());
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode form data");
            }
        }
        self
    }

    /// Set a custom end-to-end timeout for this request; the shorter of this
    /// and the client default wins.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Route this request through a specific proxy.
    pub fn proxy(mut self, url: impl AsRef<str>) -> Self {
        match url::Url::parse(url.as_ref()) {
            Ok(parsed) => self.proxy = Some(parsed),
            Err(e) => tracing::error!(error = %e, "Invalid per-request proxy URL, ignoring"),
        }
        self
    }

    /// Dispatch directly, bypassing any configured proxy.
    pub fn no_proxy(mut self) -> Self {
        self.no_proxy = true;
        self
    }

    /// Deliver the response body as a stream the caller must release.
    ///
    /// Streaming requests bypass the cache and response decompression, and a
    /// streaming request body is never replayed by the retry engine.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set basic authentication.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        self.header(
            "Authorization",
            basic_credentials(&username.into(), password.map(Into::into).as_deref()),
        )
    }

    /// Build the URL with query parameters.
    fn build_url(&self) -> Result<url::Url> {
        let mut url = if let Some(base) = &self.client.config().base_url {
            let base =
                url::Url::parse(base).map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;
            base.join(&self.url)
                .map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?
        } else {
            url::Url::parse(&self.url).map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?
        };

        if !self.query.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                query_pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Send the request through the pipeline.
    pub async fn send(self) -> Result<Response> {
        let url = self.build_url()?;
        let config = self.client.config();

        let mut request = reqwest::Request::new(self.method, url);

        for (name, value) in &config.default_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                request.headers_mut().insert(name, value);
            }
        }

        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        if let Some((username, password)) = &config.basic_auth {
            if !request.headers().contains_key(http::header::AUTHORIZATION) {
                if let Ok(value) = basic_credentials(username, Some(password)).parse() {
                    request
                        .headers_mut()
                        .insert(http::header::AUTHORIZATION, value);
                }
            }
        }

        if let Some(body) = self.body {
            *request.body_mut() = Some(body.into());
        }

        // The shorter of the client default and the per-request timeout.
        let effective_timeout = match self.timeout {
            Some(timeout) => timeout.min(config.timeout),
            None => config.timeout,
        };

        let overrides = RequestOverrides {
            deadline: Some(Instant::now() + effective_timeout),
            timeout: Some(effective_timeout),
            proxy: self.proxy,
            no_proxy: self.no_proxy,
            streaming: self.streaming,
        };

        self.client.execute(request, overrides).await
    }
}

fn basic_credentials(username: &str, password: Option<&str>) -> String {
    use base64::Engine;
    let credentials = match password {
        Some(p) => format!("{username}:{p}"),
        None => format!("{username}:"),
    };
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}
