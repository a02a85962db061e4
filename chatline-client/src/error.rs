//! API error types.

use chatline_core::ConfigError;
use chatline_retries::{Cancelled, Retryable};
use chatline_streaming::StreamError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Failure of a remote call.
///
/// Message text that came from the server is untrusted and may be a
/// generic fallback; match on the variant or [`ApiError::kind`], not on
/// the message.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Missing or invalid configuration, detected before any request.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Connection-level failure (DNS, TCP, TLS, per-attempt timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP 429.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Server message or status-line fallback.
        message: String,
        /// Server error code.
        code: Option<String>,
        /// `Retry-After` hint.
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server message or status-line fallback.
        message: String,
        /// Server error code.
        code: Option<String>,
    },

    /// HTTP 4xx other than 429.
    #[error("API error ({status}): {message}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// Server message or status-line fallback.
        message: String,
        /// Server error code.
        code: Option<String>,
    },

    /// The caller cancelled the call.
    #[error("Request cancelled")]
    Cancelled,

    /// The call exceeded its overall deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A successful response did not contain the expected body.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Field-less discriminant of [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`ApiError::Configuration`].
    Configuration,
    /// See [`ApiError::Transport`].
    Transport,
    /// See [`ApiError::RateLimited`].
    RateLimited,
    /// See [`ApiError::Server`].
    Server,
    /// See [`ApiError::Client`].
    Client,
    /// See [`ApiError::Cancelled`].
    Cancelled,
    /// See [`ApiError::Timeout`].
    Timeout,
    /// See [`ApiError::InvalidResponse`].
    InvalidResponse,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ApiError {
    /// Build the typed error for a non-success response.
    ///
    /// The body is parsed as `{"error":{"message","code"}}` when possible;
    /// anything else falls back to `HTTP <status>: <reason>`.
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        let (message, code) = parse_error_body(body);
        let message = message.unwrap_or_else(|| status_line_message(status));
        let status_code = status.as_u16();

        match status_code {
            429 => ApiError::RateLimited {
                message,
                code,
                retry_after: parse_retry_after(headers),
            },
            500..=599 => ApiError::Server {
                status: status_code,
                message,
                code,
            },
            _ => ApiError::Client {
                status: status_code,
                message,
                code,
            },
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Discriminant for matching.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Configuration(_) => ErrorKind::Configuration,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Client { .. } => ErrorKind::Client,
            ApiError::Cancelled => ErrorKind::Cancelled,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Whether the retry policy may try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(_) | ApiError::RateLimited { .. } | ApiError::Server { .. }
        )
    }

    /// Whether the caller stopped the call.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// Server `Retry-After` hint.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status, for HTTP-level failures.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server error code, when one was supplied.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::RateLimited { code, .. }
            | ApiError::Server { code, .. }
            | ApiError::Client { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Server message for HTTP-level failures, else the display text.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            ApiError::RateLimited { message, .. }
            | ApiError::Server { message, .. }
            | ApiError::Client { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl Retryable for ApiError {
    fn is_retryable(&self) -> bool {
        ApiError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        ApiError::retry_after(self)
    }

    fn is_cancellation(&self) -> bool {
        self.is_cancelled()
    }

    fn status(&self) -> Option<u16> {
        ApiError::status(self)
    }
}

impl From<Cancelled> for ApiError {
    fn from(_: Cancelled) -> Self {
        ApiError::Cancelled
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            ApiError::Transport(format!("connection failed: {err}"))
        } else if err.is_builder() {
            ApiError::Configuration(ConfigError::invalid_setting("request", err.to_string()))
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Cancelled => ApiError::Cancelled,
            StreamError::Timeout(after) => ApiError::Timeout(after),
            StreamError::Transport(source) => ApiError::Transport(source.to_string()),
            overflow @ StreamError::BufferOverflow { .. } => {
                ApiError::InvalidResponse(overflow.to_string())
            }
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Message and code from an `{"error": {...}}` body. Each is independent.
fn parse_error_body(body: &[u8]) -> (Option<String>, Option<String>) {
    let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) else {
        return (None, None);
    };
    let message = envelope.error.message.filter(|m| !m.trim().is_empty());
    let code = envelope.error.code.and_then(|code| match code {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    (message, code)
}

fn status_line_message(status: StatusCode) -> String {
    format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown Status")
    )
}

/// Parse a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    fn error_for(status: u16, body: &str) -> ApiError {
        ApiError::from_response(
            StatusCode::from_u16(status).unwrap(),
            &HeaderMap::new(),
            body.as_bytes(),
        )
    }

    #[test]
    fn test_client_error_with_body() {
        let err = error_for(
            401,
            r#"{"error":{"message":"invalid key","code":"invalid_api_key"}}"#,
        );
        assert_eq!(err.kind(), ErrorKind::Client);
        assert_eq!(err.message(), "invalid key");
        assert_eq!(err.code(), Some("invalid_api_key"));
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_retryable());
    }

    #[rstest]
    #[case("")]
    #[case("<html>Bad Gateway</html>")]
    #[case(r#"{"error":"flat string"}"#)]
    #[case(r#"{"error":{"message":"   "}}"#)]
    fn test_malformed_body_falls_back_to_status_line(#[case] body: &str) {
        let err = error_for(502, body);
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.message(), "HTTP 502: Bad Gateway");
        assert_eq!(err.code(), None);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_code_without_message_is_kept() {
        let err = error_for(403, r#"{"error":{"code":"unsupported_country_region_territory"}}"#);
        assert_eq!(err.kind(), ErrorKind::Client);
        assert_eq!(err.message(), "HTTP 403: Forbidden");
        assert_eq!(err.code(), Some("unsupported_country_region_territory"));
    }

    #[test]
    fn test_numeric_code() {
        let err = error_for(400, r#"{"error":{"message":"bad","code":400}}"#);
        assert_eq!(err.code(), Some("400"));
    }

    #[test]
    fn test_rate_limited_reads_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("2"));
        let err = ApiError::from_response(StatusCode::TOO_MANY_REQUESTS, &headers, b"");
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(err.message(), "HTTP 429: Too Many Requests");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retry_after_ignores_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::transport("reset").is_retryable());
        assert!(!ApiError::Cancelled.is_retryable());
        assert!(!ApiError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!ApiError::from(ConfigError::MissingApiKey).is_retryable());
        assert!(Retryable::is_cancellation(&ApiError::Cancelled));
        assert!(matches!(ApiError::from(Cancelled), ApiError::Cancelled));
    }

    #[test]
    fn test_from_stream_error() {
        assert!(ApiError::from(StreamError::Cancelled).is_cancelled());
        assert_eq!(
            ApiError::from(StreamError::Timeout(Duration::from_secs(1))).kind(),
            ErrorKind::Timeout
        );
    }
}
