//! HTTP client error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for HTTP client operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// Request failed after all retries exhausted.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error message.
        message: String,
    },

    /// Circuit breaker is open, rejecting requests.
    #[error("Circuit breaker is open, request rejected")]
    CircuitOpen,

    /// Rate limiter refused the request or the projected wait was too long.
    #[error("Rate limit exceeded for key '{key}', retry after {retry_after:?}")]
    RateLimited {
        /// Bucket key that was exhausted ("global" or the request host).
        key: String,
        /// Projected wait until a token frees.
        retry_after: Duration,
    },

    /// Request timed out.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Request was cancelled before completion.
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request building error.
    #[error("Failed to build request: {0}")]
    RequestBuild(String),

    /// Response error.
    #[error("Response error: {status} - {message}")]
    Response {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Response body decompression error.
    #[error("Decompression error: {0}")]
    Decompress(String),

    /// Underlying HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification used by callers and the metrics recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection, DNS, TLS, or reset failures.
    Network,
    /// Deadline exceeded at any layer.
    Timeout,
    /// 4xx responses surfaced as errors, or unusable requests.
    Client,
    /// 5xx responses, including exhausted retries against them.
    Server,
    /// Rejected at the open circuit breaker gate.
    CircuitBreaker,
    /// Rejected by the rate limiter.
    RateLimit,
    /// Context cancelled before completion.
    Cancelled,
    /// JSON or compression decoding failure.
    Decode,
    /// Everything else.
    Unknown,
}

impl ErrorKind {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Client => "client",
            Self::Server => "server",
            Self::CircuitBreaker => "circuit_breaker",
            Self::RateLimit => "rate_limit",
            Self::Cancelled => "cancelled",
            Self::Decode => "decode",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HttpClientError {
    /// Classify this error into the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen => ErrorKind::CircuitBreaker,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Connection(_) => ErrorKind::Network,
            Self::InvalidUrl(_) | Self::RequestBuild(_) | Self::UrlParse(_) => ErrorKind::Client,
            Self::Response { status, .. } => {
                if *status >= 500 {
                    ErrorKind::Server
                } else {
                    ErrorKind::Client
                }
            }
            Self::RetryExhausted { .. } => ErrorKind::Server,
            Self::Json(_) | Self::Decompress(_) => ErrorKind::Decode,
            Self::Http(e) => {
                if e.is_timeout() {
                    ErrorKind::Timeout
                } else if e.is_connect() {
                    ErrorKind::Network
                } else if let Some(status) = e.status() {
                    if status.is_server_error() {
                        ErrorKind::Server
                    } else {
                        ErrorKind::Client
                    }
                } else if e.is_request() {
                    ErrorKind::Network
                } else {
                    ErrorKind::Unknown
                }
            }
            Self::Io(_) => ErrorKind::Unknown,
        }
    }

    /// Check if this error was produced by an open circuit breaker.
    pub fn is_circuit_breaker(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Connection(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Response { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_)) || matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Check if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_)) || matches!(self, Self::Http(e) if e.is_connect())
    }

    /// Get the HTTP status code if this is a response error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(HttpClientError::CircuitOpen.kind(), ErrorKind::CircuitBreaker);
        assert_eq!(
            HttpClientError::RateLimited {
                key: "global".to_string(),
                retry_after: Duration::from_millis(100),
            }
            .kind(),
            ErrorKind::RateLimit
        );
        assert_eq!(
            HttpClientError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            HttpClientError::Connection("reset".to_string()).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            HttpClientError::Json("bad".to_string()).kind(),
            ErrorKind::Decode
        );
    }

    #[test]
    fn test_response_error_kind_by_status() {
        let client = HttpClientError::Response {
            status: 404,
            message: "not found".to_string(),
        };
        let server = HttpClientError::Response {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(client.kind(), ErrorKind::Client);
        assert_eq!(server.kind(), ErrorKind::Server);
    }

    #[test]
    fn test_circuit_breaker_sentinel() {
        assert!(HttpClientError::CircuitOpen.is_circuit_breaker());
        assert!(!HttpClientError::Timeout(Duration::from_secs(1)).is_circuit_breaker());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(HttpClientError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(HttpClientError::Connection("refused".to_string()).is_retryable());
        assert!(!HttpClientError::CircuitOpen.is_retryable());
        assert!(HttpClientError::Response {
            status: 503,
            message: String::new(),
        }
        .is_retryable());
    }
}
