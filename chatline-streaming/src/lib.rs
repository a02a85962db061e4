//! # chatline-streaming
//!
//! Incremental decoding of streamed chat completions.
//!
//! Completion endpoints answer a streaming request with a chunked body of
//! `data: <json>` lines ending in `data: [DONE]`. This crate turns such a
//! body into a lazy, cancellable sequence of parsed JSON chunks.
//!
//! ## Core Concepts
//!
//! - **[`SseLineDecoder`]**: Synchronous decoder; feed it reads, get payloads
//! - **[`CompletionChunkStream`]**: Async stream over a response body that
//!   honors a cancellation token and an optional deadline
//! - **[`TextDeltas`]** / **[`TextAccumulator`]**: Extract and collect text
//!
//! ## Example
//!
//! ```ignore
//! use chatline_streaming::{ChunkExt, CompletionChunkStream};
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let mut stream = CompletionChunkStream::new(response.bytes_stream(), token.clone());
//!
//! while let Some(chunk) = stream.next_chunk().await {
//!     if let Some(text) = chunk?.delta_content() {
//!         print!("{text}");
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod chunk_stream;
pub mod decoder;
pub mod error;
pub mod text;

// Re-exports
pub use chunk_stream::CompletionChunkStream;
pub use decoder::{DecoderState, SseLineDecoder, MAX_BUFFER_SIZE};
pub use error::{StreamError, StreamResult};
pub use text::{ChunkExt, TextAccumulator, TextDeltas};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        ChunkExt, CompletionChunkStream, DecoderState, SseLineDecoder, StreamError, StreamResult,
        TextAccumulator,
    };
}
