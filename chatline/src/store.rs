//! Conversation persistence.

use crate::error::StoreResult;
use async_trait::async_trait;
use chatline_core::{Conversation, ConversationId};
use indexmap::IndexMap;
use parking_lot::RwLock;

/// Storage for conversation history, keyed by conversation ID.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a conversation.
    async fn load(&self, id: &ConversationId) -> StoreResult<Option<Conversation>>;

    /// Insert or replace a conversation.
    async fn save(&self, conversation: &Conversation) -> StoreResult<()>;

    /// Delete a conversation. Returns true if it existed.
    async fn delete(&self, id: &ConversationId) -> StoreResult<bool>;

    /// All conversations, in insertion order.
    async fn list(&self) -> StoreResult<Vec<Conversation>>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: RwLock<IndexMap<ConversationId, Conversation>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.read().is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn load(&self, id: &ConversationId) -> StoreResult<Option<Conversation>> {
        Ok(self.conversations.read().get(id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        self.conversations
            .write()
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> StoreResult<bool> {
        Ok(self.conversations.write().shift_remove(id).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<Conversation>> {
        Ok(self.conversations.read().values().cloned().collect())
    }
}
