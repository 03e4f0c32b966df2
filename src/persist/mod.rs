//! Durable message persistence boundary.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Result, TachiError};
use crate::types::ChatMessage;

/// Durably records finalized messages.
///
/// The engine appends in conversation order, so a sink's index space matches
/// the engine's history indices. `delete` exists for the cancellation repair
/// path: a message removed from history must also leave the store.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn append(&self, conversation_id: Uuid, message: &ChatMessage) -> Result<()>;
    async fn delete(&self, conversation_id: Uuid, message_index: usize) -> Result<()>;
}

/// In-memory sink for tests and embedders without storage.
#[derive(Debug, Default)]
pub struct MemorySink {
    conversations: Mutex<HashMap<Uuid, Vec<ChatMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one conversation's stored messages.
    pub fn messages(&self, conversation_id: Uuid) -> Vec<ChatMessage> {
        self.conversations
            .lock()
            .unwrap()
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn append(&self, conversation_id: Uuid, message: &ChatMessage) -> Result<()> {
        self.conversations
            .lock()
            .unwrap()
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn delete(&self, conversation_id: Uuid, message_index: usize) -> Result<()> {
        let mut conversations = self.conversations.lock().unwrap();
        let messages = conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| TachiError::Persistence(format!("unknown conversation {conversation_id}")))?;
        if message_index >= messages.len() {
            return Err(TachiError::Persistence(format!(
                "message index {message_index} out of range ({} stored)",
                messages.len()
            )));
        }
        messages.remove(message_index);
        Ok(())
    }
}
