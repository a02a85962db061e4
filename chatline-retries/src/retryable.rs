//! Retry classification.

use std::time::Duration;
use thiserror::Error;

/// Classification an error must expose to be driven by the retry executor.
pub trait Retryable {
    /// Whether the failure is transient (transport failure, 5xx, 429).
    fn is_retryable(&self) -> bool;

    /// Server-provided wait hint, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Whether the failure is a caller-initiated cancellation.
    ///
    /// Cancellations are never retried.
    fn is_cancellation(&self) -> bool {
        false
    }

    /// HTTP status associated with the failure, if any.
    fn status(&self) -> Option<u16> {
        None
    }
}

/// Marker produced when a retry loop observes its cancellation token.
///
/// Error types used with the executor convert from it so the caller sees
/// their own cancellation variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;
