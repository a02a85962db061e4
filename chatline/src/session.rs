//! Conversation orchestration.
//!
//! [`ChatSession`] ties the client to a conversation store and a renderer.
//! It allows one reply in flight at a time: a second
//! [`ChatSession::send_message`] while a reply is running fails with
//! [`SessionError::AlreadyStreaming`] instead of queueing.

use crate::error::{SessionError, SessionResult};
use crate::render::DeltaRenderer;
use crate::store::ConversationStore;
use chatline_client::{ApiError, ChatClient, CompletionOptions};
use chatline_core::{
    estimate_tokens, Attachment, ChatMessage, ConfigError, Conversation, ConversationId, Message,
    STOPPED_MARKER,
};
use chatline_streaming::TextAccumulator;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Title used when a conversation is renamed to an empty string.
pub const UNTITLED: &str = "Untitled chat";

/// Result of [`ChatSession::send_message`].
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// The final assistant message as stored.
    pub message: ChatMessage,
    /// True when the user stopped the reply; the message holds the partial
    /// text followed by the stopped marker.
    pub stopped_by_user: bool,
    /// Finish reason reported by the server.
    pub finish_reason: Option<String>,
}

/// Orchestrates conversations against one client.
pub struct ChatSession {
    client: ChatClient,
    store: Arc<dyn ConversationStore>,
    active: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("client", &self.client)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight slot when the reply ends, on every path.
struct InFlight<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

enum StreamEnd {
    Completed,
    Stopped,
    Failed(ApiError),
}

impl ChatSession {
    /// Create a session.
    pub fn new(client: ChatClient, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            client,
            store,
            active: Mutex::new(None),
        }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Whether a reply is in flight.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Stop the reply in flight. Returns false if there is none.
    pub fn cancel_streaming(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(token) => {
                info!("Stopping response");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Create and store an empty conversation.
    pub async fn create_conversation(&self) -> SessionResult<Conversation> {
        let conversation = Conversation::new();
        self.store.save(&conversation).await?;
        debug!(conversation_id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    /// Load a conversation.
    pub async fn conversation(&self, id: &ConversationId) -> SessionResult<Conversation> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| SessionError::ConversationNotFound(id.clone()))
    }

    /// Delete a conversation. Returns true if it existed.
    pub async fn delete_conversation(&self, id: &ConversationId) -> SessionResult<bool> {
        Ok(self.store.delete(id).await?)
    }

    /// Change a conversation's title. An empty title becomes [`UNTITLED`].
    pub async fn rename_conversation(
        &self,
        id: &ConversationId,
        title: &str,
    ) -> SessionResult<Conversation> {
        let mut conversation = self.conversation(id).await?;
        let title = title.trim();
        conversation.title = if title.is_empty() {
            UNTITLED.to_string()
        } else {
            title.to_string()
        };
        conversation.touch();
        self.store.save(&conversation).await?;
        Ok(conversation)
    }

    /// Remove one message from a conversation. Returns true if it existed.
    pub async fn delete_message(
        &self,
        id: &ConversationId,
        message_id: &str,
    ) -> SessionResult<bool> {
        let mut conversation = self.conversation(id).await?;
        let removed = conversation.remove_message(message_id);
        if removed {
            self.store.save(&conversation).await?;
        }
        Ok(removed)
    }

    /// Conversations whose title or messages contain `query`, most
    /// recently updated first.
    pub async fn search(&self, query: &str) -> SessionResult<Vec<Conversation>> {
        let mut found: Vec<_> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|c| c.matches(query))
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    /// Send a user message and obtain the assistant reply.
    ///
    /// With streaming enabled in the client configuration, each text
    /// fragment is appended to the stored assistant message and handed to
    /// `renderer`. A reply stopped through [`ChatSession::cancel_streaming`]
    /// keeps its partial text and is reported with `stopped_by_user`.
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        attachments: Vec<Attachment>,
        renderer: &dyn DeltaRenderer,
    ) -> SessionResult<SendOutcome> {
        let content = content.trim();
        if content.is_empty() && attachments.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let config = self.client.config();
        if config.api_key.trim().is_empty() {
            return Err(ApiError::from(ConfigError::MissingApiKey).into());
        }

        let token = CancellationToken::new();
        let _in_flight = self.begin(token.clone())?;

        let mut conversation = self.conversation(conversation_id).await?;
        conversation.push(
            ChatMessage::user(content)
                .with_attachments(attachments)
                .with_tokens(estimate_tokens(content, &config.model)),
        );
        self.store.save(&conversation).await?;

        let history = conversation.build_history(config.system_prompt.as_deref());
        debug!(
            conversation_id = %conversation.id,
            messages = history.len(),
            stream = config.stream,
            "Sending message"
        );

        if config.stream {
            self.reply_streaming(conversation, history, token, renderer)
                .await
        } else {
            self.reply_single(conversation, history, token, renderer)
                .await
        }
    }

    fn begin(&self, token: CancellationToken) -> SessionResult<InFlight<'_>> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(SessionError::AlreadyStreaming);
        }
        *active = Some(token);
        Ok(InFlight {
            slot: &self.active,
        })
    }

    async fn reply_streaming(
        &self,
        mut conversation: Conversation,
        history: Vec<Message>,
        token: CancellationToken,
        renderer: &dyn DeltaRenderer,
    ) -> SessionResult<SendOutcome> {
        let model = self.client.config().model.clone();
        let placeholder = ChatMessage::assistant_placeholder();
        let reply_id = placeholder.id.clone();
        conversation.push(placeholder);
        self.store.save(&conversation).await?;

        let mut text = TextAccumulator::new();
        let end = match self
            .client
            .create_chat_completion_stream(history, &CompletionOptions::new(), token)
            .await
        {
            Ok(mut stream) => loop {
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        let Some(delta) = text.push(&chunk).map(str::to_owned) else {
                            continue;
                        };
                        if let Some(message) = conversation.message_mut(&reply_id) {
                            message.content.push_str(&delta);
                        }
                        renderer.on_delta(&reply_id, &delta, text.text());
                    }
                    Some(Err(error)) if error.is_cancellation() => break StreamEnd::Stopped,
                    Some(Err(error)) => break StreamEnd::Failed(error.into()),
                    None => break StreamEnd::Completed,
                }
            },
            Err(ApiError::Cancelled) => StreamEnd::Stopped,
            Err(error) => StreamEnd::Failed(error),
        };

        let stopped = matches!(end, StreamEnd::Stopped);
        let conversation_id = conversation.id.clone();
        let message = conversation
            .message_mut(&reply_id)
            .ok_or(SessionError::ConversationNotFound(conversation_id))?;
        message.streaming = false;
        if stopped {
            message.content.push_str(STOPPED_MARKER);
        }
        let tokens = text
            .completion_tokens()
            .unwrap_or_else(|| estimate_tokens(text.text(), &model));
        message.tokens = Some(tokens);
        let message = message.clone();
        conversation.touch();
        self.store.save(&conversation).await?;

        match end {
            StreamEnd::Failed(error) => {
                warn!(
                    conversation_id = %conversation.id,
                    chunks = text.chunk_count(),
                    error = %error,
                    "Streaming reply failed"
                );
                Err(error.into())
            }
            _ => {
                if stopped {
                    info!(conversation_id = %conversation.id, "Response stopped by user");
                }
                renderer.on_complete(&message);
                Ok(SendOutcome {
                    message,
                    stopped_by_user: stopped,
                    finish_reason: text.finish_reason().map(str::to_owned),
                })
            }
        }
    }

    async fn reply_single(
        &self,
        mut conversation: Conversation,
        history: Vec<Message>,
        token: CancellationToken,
        renderer: &dyn DeltaRenderer,
    ) -> SessionResult<SendOutcome> {
        let model = &self.client.config().model;
        let options = CompletionOptions::new();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ApiError::Cancelled),
            response = self.client.create_chat_completion(history, &options) => response,
        };
        let response = outcome?;

        let content = response.text().unwrap_or_default().to_string();
        let tokens = response
            .usage
            .map(|u| u.completion_tokens)
            .filter(|&t| t > 0)
            .unwrap_or_else(|| estimate_tokens(&content, model));
        let message = ChatMessage::assistant(content).with_tokens(tokens);

        conversation.push(message.clone());
        self.store.save(&conversation).await?;
        renderer.on_complete(&message);

        Ok(SendOutcome {
            message,
            stopped_by_user: false,
            finish_reason: response.finish_reason().map(str::to_owned),
        })
    }
}
