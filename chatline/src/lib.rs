//! # chatline - Streaming Chat Client for Rust
//!
//! chatline is a client for OpenAI-style chat completion APIs. It decodes
//! server-sent event streams into text deltas, retries failed calls with
//! backoff, and keeps conversation history for a chat front end.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chatline::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ChatClient::new(ClientConfig::from_env()?)?;
//!     let session = ChatSession::new(client, Arc::new(InMemoryStore::new()));
//!
//!     let conversation = session.create_conversation().await?;
//!     let print = |_: &str, delta: &str, _: &str| print!("{delta}");
//!     let outcome = session
//!         .send_message(&conversation.id, "What is the capital of France?", vec![], &print)
//!         .await?;
//!
//!     println!("\n({} tokens)", outcome.message.tokens.unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! chatline is organized as a workspace of focused crates:
//!
//! - [`core`]: configuration, messages, conversations, token estimates
//! - [`retries`]: retry policy, backoff strategies, injectable sleeper
//! - [`streaming`]: SSE decoding and cancellable chunk streams
//! - [`client`]: typed errors, transport and the API client
//!
//! This crate adds [`ChatSession`], which orchestrates one conversation
//! reply at a time against a [`ConversationStore`] and a [`DeltaRenderer`].

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod render;
pub mod session;
pub mod store;

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Configuration, messages and conversations.
pub use chatline_core as core;

/// Retry policy and backoff.
pub use chatline_retries as retries;

/// Event-stream decoding.
pub use chatline_streaming as streaming;

/// API client.
pub use chatline_client as client;

// ============================================================================
// Type Re-exports
// ============================================================================

pub use chatline_client::{
    ApiError, ApiResult, ChatClient, ChunkStream, CompletionOptions, ErrorKind, HealthReport,
    HealthStatus, RateLimitSnapshot, RequestDescriptor,
};
pub use chatline_core::{
    Attachment, ChatMessage, ClientConfig, ConfigError, Conversation, ConversationId, Message,
    Role, SamplingSettings,
};
pub use chatline_retries::{RetryConfig, WaitStrategy};
pub use chatline_streaming::{ChunkExt, StreamError, TextAccumulator};
pub use error::{SessionError, SessionResult, StoreError, StoreResult};
pub use render::{DeltaRenderer, NoopRenderer};
pub use session::{ChatSession, SendOutcome, UNTITLED};
pub use store::{ConversationStore, InMemoryStore};

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient prelude for common imports.
///
/// ```ignore
/// use chatline::prelude::*;
/// ```
pub mod prelude {
    // Configuration and conversations
    pub use crate::core::{
        Attachment, ChatMessage, ClientConfig, Conversation, ConversationId, Message,
        SamplingSettings,
    };

    // Client
    pub use crate::client::{ApiError, ChatClient, CompletionOptions, ErrorKind};

    // Streaming
    pub use crate::streaming::{ChunkExt, TextAccumulator};

    // Retries
    pub use crate::retries::RetryConfig;

    // Session
    pub use crate::{
        ChatSession, ConversationStore, DeltaRenderer, InMemoryStore, NoopRenderer, SendOutcome,
        SessionError,
    };
}

/// Returns the current version of chatline.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.1.0");
    }
}
