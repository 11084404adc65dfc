//! Message persistence for Courier.
//!
//! [`MessageStore`] is the seam to the backing store; production deployments
//! put a database behind it, and [`MemoryStore`] serves the single-process
//! case and tests.

use crate::conversation::{validate_identity, ConversationId};
use crate::message::Message;
use async_trait::async_trait;
use courier_protocol::DeliveryStatus;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, trace};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Message text was empty.
    #[error("Message text cannot be empty")]
    EmptyText,

    /// An identity failed validation.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(&'static str),

    /// The backing store is unreachable. Callers may retry with backoff;
    /// the store never retries internally.
    #[error("Message store unavailable: {0}")]
    Unavailable(String),
}

/// Durable, append-only message storage keyed by conversation.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message with status `sent`.
    ///
    /// Returns the stored record including its server-assigned timestamp.
    async fn append(
        &self,
        sender: &str,
        receiver: &str,
        text: &str,
    ) -> Result<Message, StoreError>;

    /// List all messages in a conversation, ordered by creation time
    /// ascending. Unknown conversations yield an empty list.
    async fn list(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Transition every message in the conversation addressed to `receiver`
    /// that is not already `seen` to `seen`, atomically.
    ///
    /// Returns the number of rows changed; 0 is not an error.
    async fn mark_seen(&self, conversation_id: &str, receiver: &str) -> Result<u64, StoreError>;
}

/// In-memory message store, partitioned by conversation.
///
/// Each conversation lives under one map entry; `append` and `mark_seen`
/// both run inside that entry's lock, which makes the seen sweep a single
/// atomic conditional bulk update with respect to concurrent appends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: DashMap<ConversationId, Vec<Message>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations with at least one message.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}

fn validate(sender: &str, receiver: &str, text: &str) -> Result<(), StoreError> {
    validate_identity(sender).map_err(StoreError::InvalidIdentity)?;
    validate_identity(receiver).map_err(StoreError::InvalidIdentity)?;
    if text.trim().is_empty() {
        return Err(StoreError::EmptyText);
    }
    Ok(())
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(
        &self,
        sender: &str,
        receiver: &str,
        text: &str,
    ) -> Result<Message, StoreError> {
        validate(sender, receiver, text)?;

        let message = Message::new(sender, receiver, text);
        let mut entry = self
            .conversations
            .entry(message.conversation_id.clone())
            .or_default();
        entry.push(message.clone());

        trace!(
            conversation = %message.conversation_id,
            sender = %sender,
            "Appended message"
        );

        Ok(message)
    }

    async fn list(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let mut messages = self
            .conversations
            .get(conversation_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        // Stable: equal timestamps keep insertion order.
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn mark_seen(&self, conversation_id: &str, receiver: &str) -> Result<u64, StoreError> {
        let Some(mut entry) = self.conversations.get_mut(conversation_id) else {
            return Ok(0);
        };

        let mut changed = 0u64;
        for message in entry.iter_mut() {
            if message.receiver == receiver && message.advance_status(DeliveryStatus::Seen) {
                changed += 1;
            }
        }

        if changed > 0 {
            debug!(conversation = %conversation_id, rows = changed, "Marked seen");
        }

        Ok(changed)
    }
}
