//! The stored message record.

use crate::conversation::{conversation_id, ConversationId, Identity};
use chrono::{DateTime, Utc};
use courier_protocol::{DeliveryStatus, MessagePayload};
use serde::{Deserialize, Serialize};

/// A private message.
///
/// All fields except `status` are immutable once persisted. `status` only
/// moves forward and is owned by the store; routed copies are transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identity that sent the message.
    pub sender: Identity,
    /// Identity the message is addressed to.
    pub receiver: Identity,
    /// Message body.
    pub text: String,
    /// Derived partition key for the sender/receiver pair.
    pub conversation_id: ConversationId,
    /// Server-assigned creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Delivery status of the stored row.
    pub status: DeliveryStatus,
}

impl Message {
    /// Create a new message with status `sent` and the current timestamp.
    #[must_use]
    pub fn new(
        sender: impl Into<Identity>,
        receiver: impl Into<Identity>,
        text: impl Into<String>,
    ) -> Self {
        let sender = sender.into();
        let receiver = receiver.into();
        let conversation_id = conversation_id(&sender, &receiver);
        Self {
            sender,
            receiver,
            text: text.into(),
            conversation_id,
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
        }
    }

    /// Advance the status, returning `true` if it changed.
    ///
    /// Backwards transitions are no-ops.
    pub fn advance_status(&mut self, to: DeliveryStatus) -> bool {
        self.status.advance(to)
    }

    /// Build the wire payload for a push, with an explicit status label.
    ///
    /// The label may differ from the stored status: a push to an online
    /// receiver carries `delivered` while the row itself stays `sent`.
    #[must_use]
    pub fn wire(&self, label: DeliveryStatus) -> MessagePayload {
        MessagePayload {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            text: self.text.clone(),
            conversation_id: self.conversation_id.clone(),
            created_at: self.created_at,
            status: label,
        }
    }
}
