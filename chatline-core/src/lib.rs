//! # chatline-core
//!
//! Core types for the chatline client.
//!
//! - **Settings**: [`ClientConfig`] and [`SamplingSettings`], the explicit
//!   context every call runs against
//! - **Messages**: wire-level `{role, content}` entries
//! - **Conversation**: stored chat history and history building
//! - **Usage**: token and cost estimation heuristics
//! - **Identifiers**: prefixed UUIDs for conversations and messages
//!
//! ## Example
//!
//! ```rust
//! use chatline_core::{ChatMessage, ClientConfig, Conversation};
//!
//! let config = ClientConfig::new("sk-test").with_system_prompt("Be brief.");
//!
//! let mut conversation = Conversation::new();
//! conversation.push(ChatMessage::user("Hello!"));
//!
//! let history = conversation.build_history(config.system_prompt.as_deref());
//! assert_eq!(history.len(), 2);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod conversation;
pub mod errors;
pub mod identifier;
pub mod messages;
pub mod settings;
pub mod usage;

pub use conversation::{generate_title, Attachment, ChatMessage, Conversation, STOPPED_MARKER};
pub use errors::{ConfigError, ConfigResult};
pub use identifier::{generate_conversation_id, generate_message_id, now_utc, ConversationId};
pub use messages::{ContentPart, ImageDetail, ImageUrl, Message, MessageContent, Role};
pub use settings::{looks_like_api_key, ClientConfig, SamplingSettings};
pub use usage::{calculate_cost, estimate_tokens, CostEstimate, ModelPricing};
