//! Streaming errors.

use std::time::Duration;
use thiserror::Error;

/// Errors that end a completion stream.
///
/// A malformed frame is not one of them: the decoder logs and skips it.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Reading the response body failed.
    #[error("Transport error while reading stream: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The stream was cancelled by the caller.
    #[error("Stream cancelled")]
    Cancelled,

    /// The stream exceeded its deadline.
    #[error("Stream timed out after {0:?}")]
    Timeout(Duration),

    /// A single line grew past the buffer limit without a line break.
    #[error("Stream buffer exceeded {limit} bytes without a line break")]
    BufferOverflow {
        /// Limit in bytes.
        limit: usize,
    },
}

impl StreamError {
    /// Wrap a transport failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Transport(err.into())
    }

    /// Whether the stream ended because the caller asked it to.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StreamError::Cancelled.to_string(), "Stream cancelled");
        assert_eq!(
            StreamError::Timeout(Duration::from_secs(5)).to_string(),
            "Stream timed out after 5s"
        );
        let err = StreamError::transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(
            err.to_string(),
            "Transport error while reading stream: reset by peer"
        );
    }

    #[test]
    fn test_is_cancellation() {
        assert!(StreamError::Cancelled.is_cancellation());
        assert!(!StreamError::Timeout(Duration::ZERO).is_cancellation());
    }
}
