//! Session error types.

use chatline_client::ApiError;
use chatline_core::ConversationId;
use thiserror::Error;

/// Failure reported by a [`crate::ConversationStore`].
#[derive(Debug, Clone, Error)]
#[error("Store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    /// Create a store error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The remote call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Loading or saving a conversation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A reply is already streaming.
    #[error("A response is already in progress")]
    AlreadyStreaming,

    /// No conversation with this ID.
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// Nothing to send.
    #[error("Message is empty")]
    EmptyMessage,
}

impl SessionError {
    /// Whether the user stopped the call.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Api(e) if e.is_cancelled())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
