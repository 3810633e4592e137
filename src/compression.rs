//! Transparent request/response compression.

use crate::middleware::{Middleware, MiddlewareChain};
use crate::{HttpClientError, Response, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Request;
use std::io::Write;

/// Supported content encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Gzip (always available).
    Gzip,
    /// Deflate (zlib stream).
    Deflate,
}

impl Encoding {
    /// The `Content-Encoding` header token.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }

    /// Parse a `Content-Encoding` header token.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }

    /// Compress a buffer with this encoding.
    pub fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>> {
        let compression = flate2::Compression::new(level);
        match self {
            Self::Gzip => {
                let mut encoder = flate2::write::GzEncoder::new(Vec::new(), compression);
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Self::Deflate => {
                let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), compression);
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
        }
    }

    /// Decompress a buffer encoded with this encoding.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut decoder = flate2::write::GzDecoder::new(Vec::new());
                decoder
                    .write_all(data)
                    .map_err(|e| HttpClientError::Decompress(e.to_string()))?;
                decoder
                    .finish()
                    .map_err(|e| HttpClientError::Decompress(e.to_string()))
            }
            Self::Deflate => {
                let mut decoder = flate2::write::ZlibDecoder::new(Vec::new());
                decoder
                    .write_all(data)
                    .map_err(|e| HttpClientError::Decompress(e.to_string()))?;
                decoder
                    .finish()
                    .map_err(|e| HttpClientError::Decompress(e.to_string()))
            }
        }
    }
}

/// Compression configuration.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Compress request bodies.
    pub enable_request: bool,
    /// Advertise `Accept-Encoding` and decode response bodies.
    pub enable_response: bool,
    /// Minimum request body size worth compressing.
    pub min_size: usize,
    /// Compression level (1-9).
    pub level: u32,
    /// Content-type prefixes eligible for request compression.
    pub compressible_types: Vec<String>,
    /// Encodings in preference order; the first is used for requests.
    pub preferred_encodings: Vec<Encoding>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enable_request: true,
            enable_response: true,
            min_size: 1024,
            level: 6,
            compressible_types: vec![
                "application/json".to_string(),
                "application/xml".to_string(),
                "application/javascript".to_string(),
                "text/".to_string(),
            ],
            preferred_encodings: vec![Encoding::Gzip, Encoding::Deflate],
        }
    }
}

impl CompressionConfig {
    /// Set the minimum request body size.
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the compression level.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.clamp(1, 9);
        self
    }

    /// Enable or disable request body compression.
    pub fn with_request(mut self, enable: bool) -> Self {
        self.enable_request = enable;
        self
    }

    /// Enable or disable response negotiation and decoding.
    pub fn with_response(mut self, enable: bool) -> Self {
        self.enable_response = enable;
        self
    }

    /// Set the encoding preference order.
    pub fn with_preferred_encodings(mut self, encodings: Vec<Encoding>) -> Self {
        self.preferred_encodings = encodings;
        self
    }

    fn is_compressible_type(&self, content_type: &str) -> bool {
        let content_type = content_type.to_ascii_lowercase();
        self.compressible_types
            .iter()
            .any(|t| content_type.starts_with(t.as_str()))
    }

    fn accept_encoding_value(&self) -> String {
        self.preferred_encodings
            .iter()
            .map(|e| e.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Compression middleware.
///
/// Encodes eligible request bodies, advertises `Accept-Encoding`, and decodes
/// materialized response bodies so downstream layers see plain bytes.
pub struct CompressionMiddleware {
    config: CompressionConfig,
}

impl CompressionMiddleware {
    /// Create a new compression middleware.
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    fn should_compress_request(&self, request: &Request) -> bool {
        if !self.config.enable_request
            || request.headers().contains_key(CONTENT_ENCODING)
        {
            return false;
        }
        let Some(body_len) = request
            .body()
            .and_then(|b| b.as_bytes())
            .map(<[u8]>::len)
        else {
            return false;
        };
        if body_len < self.config.min_size {
            return false;
        }
        request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|t| self.config.is_compressible_type(t))
            .unwrap_or(false)
    }

    fn compress_request(&self, request: &mut Request) -> Result<()> {
        let Some(encoding) = self.config.preferred_encodings.first().copied() else {
            return Ok(());
        };
        let Some(body) = request.body().and_then(|b| b.as_bytes()) else {
            return Ok(());
        };

        let compressed = encoding.compress(body, self.config.level)?;
        let headers = request.headers_mut();
        headers.insert(
            CONTENT_ENCODING,
            http::HeaderValue::from_static(encoding.name()),
        );
        headers.insert(CONTENT_LENGTH, http::HeaderValue::from(compressed.len()));
        *request.body_mut() = Some(compressed.into());
        Ok(())
    }
}

#[async_trait]
impl Middleware for CompressionMiddleware {
    fn name(&self) -> &'static str {
        "compression"
    }

    async fn handle(&self, mut request: Request, next: &MiddlewareChain) -> Result<Response> {
        if self.should_compress_request(&request) {
            self.compress_request(&mut request)?;
        }

        if self.config.enable_response && !request.headers().contains_key(ACCEPT_ENCODING) {
            if let Ok(value) = self.config.accept_encoding_value().parse() {
                request.headers_mut().insert(ACCEPT_ENCODING, value);
            }
        }

        let mut response = next.next(request).await?;

        if self.config.enable_response && !response.is_streaming() {
            let encoding = response
                .header("content-encoding")
                .and_then(Encoding::from_name);
            if let Some(encoding) = encoding {
                let decoded = encoding.decompress(response.bytes())?;
                let headers = response.headers_mut();
                headers.remove(CONTENT_ENCODING);
                headers.insert(CONTENT_LENGTH, http::HeaderValue::from(decoded.len()));
                response.set_body(Bytes::from(decoded));
            }
        }

        Ok(response)
    }
}
