//! # chatline-client
//!
//! Retrying HTTP client for OpenAI-style chat completion APIs.
//!
//! This crate provides:
//!
//! - [`ChatClient`]: the client context with `call`, `call_with_retry` and
//!   `stream_call`, plus the chat, models, embeddings, moderation, speech,
//!   vision and health endpoints
//! - [`ApiError`]: the typed failure taxonomy
//! - [`RequestDescriptor`]: an immutable description of one logical call
//! - [`Transport`]: the single-exchange HTTP seam, with [`ReqwestTransport`]
//! - [`RateLimitSnapshot`]: counters read from the last successful response
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatline_client::prelude::*;
//! use chatline_core::{ClientConfig, Message};
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ApiError> {
//!     let client = ChatClient::new(ClientConfig::from_env()?)?;
//!
//!     let mut deltas = client
//!         .create_chat_completion_stream(
//!             vec![Message::user("Hello!")],
//!             &CompletionOptions::new(),
//!             CancellationToken::new(),
//!         )
//!         .await?
//!         .text_deltas();
//!
//!     while let Some(delta) = deltas.next().await {
//!         print!("{}", delta?);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod request;
pub mod transport;
pub mod types;

// Re-exports
pub use client::{ChatClient, ChunkStream, HEALTH_CHECK_TIMEOUT};
pub use error::{ApiError, ApiResult, ErrorKind};
pub use rate_limit::RateLimitSnapshot;
pub use request::{MultipartForm, MultipartPart, PartValue, RequestBody, RequestDescriptor};
pub use transport::{ByteStream, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use types::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, CompletionOptions, Embedding,
    EmbeddingInput, EmbeddingRequest, EmbeddingResponse, HealthReport, HealthStatus, ImageSource,
    ModelInfo, ModerationRequest, ModerationResponse, ModerationResult, ResponseMessage,
    SpeechOptions, Usage, VisionOptions,
};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        ApiError, ApiResult, ChatClient, CompletionOptions, ErrorKind, RequestDescriptor,
        Transport,
    };
}
