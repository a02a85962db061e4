//! Conversation state.
//!
//! A [`Conversation`] is the ordered list of stored [`ChatMessage`]s for one
//! chat. It knows how to turn itself into the wire history sent with a
//! completion request; persistence and rendering are handled elsewhere.

use crate::identifier::{generate_message_id, now_utc, ConversationId};
use crate::messages::{Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum characters kept when deriving a title from the first message.
pub const TITLE_MAX_CHARS: usize = 30;

/// Marker appended to an assistant message whose stream was stopped by the user.
pub const STOPPED_MARKER: &str = "\n\n*[stopped]*";

/// A file attached to a user message.
///
/// Only the name travels to the model; the bytes stay with the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name of the file.
    pub name: String,
    /// MIME type, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size in bytes, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Attachment {
    /// Create an attachment from a file name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            size: None,
        }
    }
}

/// A stored message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Text content. Grows while an assistant reply is streaming.
    pub content: String,
    /// Attached files (user messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Token count (reported or estimated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    /// True while the reply is still being received.
    #[serde(default)]
    pub streaming: bool,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a finished assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an empty assistant placeholder that will be filled by a stream.
    #[must_use]
    pub fn assistant_placeholder() -> Self {
        let mut msg = Self::with_role(Role::Assistant, String::new());
        msg.streaming = true;
        msg
    }

    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: generate_message_id(),
            role,
            content,
            attachments: Vec::new(),
            timestamp: now_utc(),
            tokens: None,
            streaming: false,
        }
    }

    /// Attach files.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Set the token count.
    #[must_use]
    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Wire form of this message, or `None` if it must not be sent.
    ///
    /// Assistant messages that are empty or still streaming are skipped.
    #[must_use]
    pub fn to_wire(&self) -> Option<Message> {
        match self.role {
            Role::User => {
                if self.attachments.is_empty() {
                    Some(Message::user(self.content.clone()))
                } else {
                    let files = self
                        .attachments
                        .iter()
                        .map(|a| format!("[file: {}]", a.name))
                        .collect::<Vec<_>>()
                        .join(" ");
                    Some(Message::user(format!("{}\n\n{}", self.content, files)))
                }
            }
            Role::Assistant if !self.content.is_empty() && !self.streaming => {
                Some(Message::assistant(self.content.clone()))
            }
            Role::Assistant => None,
            Role::System => Some(Message::system(self.content.clone())),
        }
    }
}

/// A single chat and its message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Messages in arrival order.
    pub messages: Vec<ChatMessage>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        let now = now_utc();
        Self {
            id: ConversationId::new(),
            title: "New chat".to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and bump `updated_at`.
    ///
    /// The first user message also sets the title.
    pub fn push(&mut self, message: ChatMessage) {
        if self.messages.is_empty() && message.role == Role::User {
            self.title = generate_title(&message.content);
        }
        self.messages.push(message);
        self.touch();
    }

    /// Find a message by ID.
    pub fn message_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Remove a message by ID. Returns true if a message was removed.
    pub fn remove_message(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        let removed = self.messages.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Last message, if any.
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Bump the modification time.
    pub fn touch(&mut self) {
        self.updated_at = now_utc();
    }

    /// Build the wire history for a completion request.
    #[must_use]
    pub fn build_history(&self, system_prompt: Option<&str>) -> Vec<Message> {
        let mut history = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
            history.push(Message::system(prompt));
        }
        history.extend(self.messages.iter().filter_map(ChatMessage::to_wire));
        history
    }

    /// Case-insensitive match against the title and message contents.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&query)
            || self
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(&query))
    }
}

/// Derive a title from the first message of a conversation.
#[must_use]
pub fn generate_title(first_message: &str) -> String {
    let title: String = first_message.chars().take(TITLE_MAX_CHARS).collect();
    if first_message.chars().count() > TITLE_MAX_CHARS {
        format!("{title}...")
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_generate_title() {
        assert_eq!(generate_title("Hello"), "Hello");
        let long = "a".repeat(40);
        assert_eq!(generate_title(&long), format!("{}...", "a".repeat(30)));
        assert_eq!(generate_title(&"b".repeat(30)), "b".repeat(30));
    }

    #[test]
    fn test_generate_title_counts_chars_not_bytes() {
        let persian = "سلام دنیا، این یک پیام طولانی برای آزمایش عنوان است";
        let title = generate_title(persian);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn test_first_user_message_sets_title() {
        let mut conv = Conversation::new();
        conv.push(ChatMessage::user("What is Rust?"));
        conv.push(ChatMessage::user("Second"));
        assert_eq!(conv.title, "What is Rust?");
    }

    #[test]
    fn test_build_history() {
        let mut conv = Conversation::new();
        conv.push(
            ChatMessage::user("Look at these")
                .with_attachments(vec![Attachment::new("a.txt"), Attachment::new("b.png")]),
        );
        conv.push(ChatMessage::assistant("Done."));
        conv.push(ChatMessage::user("Thanks"));
        conv.push(ChatMessage::assistant(""));
        conv.push(ChatMessage::assistant_placeholder());

        let history = conv.build_history(Some("Be helpful."));

        assert_eq!(
            history,
            vec![
                Message::system("Be helpful."),
                Message::user("Look at these\n\n[file: a.txt] [file: b.png]"),
                Message::assistant("Done."),
                Message::user("Thanks"),
            ]
        );
    }

    #[test]
    fn test_build_history_without_system_prompt() {
        let mut conv = Conversation::new();
        conv.push(ChatMessage::user("Hi"));
        assert_eq!(conv.build_history(None), vec![Message::user("Hi")]);
        assert_eq!(conv.build_history(Some("")), vec![Message::user("Hi")]);
    }

    #[test]
    fn test_remove_message() {
        let mut conv = Conversation::new();
        let msg = ChatMessage::user("Hi");
        let id = msg.id.clone();
        conv.push(msg);
        assert!(conv.remove_message(&id));
        assert!(!conv.remove_message(&id));
        assert!(conv.messages.is_empty());
    }

    #[test]
    fn test_matches() {
        let mut conv = Conversation::new();
        conv.push(ChatMessage::user("Tell me about Tokio"));
        conv.push(ChatMessage::assistant("Tokio is an async runtime."));
        assert!(conv.matches("tokio"));
        assert!(conv.matches("RUNTIME"));
        assert!(conv.matches(""));
        assert!(!conv.matches("python"));
    }
}
