//! Event types for the Courier wire protocol.
//!
//! Every event is a JSON text frame shaped as `{"event": ..., "data": ...}`.
//! The event names and payload fields are a compatibility contract with
//! deployed clients and must not change.

use crate::status::DeliveryStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable error codes carried by [`ServerEvent::Error`].
pub mod codes {
    /// Event could not be parsed.
    pub const MALFORMED_EVENT: u16 = 1001;
    /// An event other than `join` arrived before registration.
    pub const NOT_JOINED: u16 = 1002;
    /// Event references an identity other than the session's bound one.
    pub const IDENTITY_MISMATCH: u16 = 1003;
    /// Identity failed validation.
    pub const INVALID_IDENTITY: u16 = 1004;
    /// Message text was empty.
    pub const EMPTY_TEXT: u16 = 1005;
    /// The pair is not permitted to exchange messages.
    pub const UNAUTHORIZED: u16 = 1006;
    /// The backing message store was unreachable.
    pub const STORE_UNAVAILABLE: u16 = 1007;
    /// Message text exceeded the configured limit.
    pub const MESSAGE_TOO_LARGE: u16 = 1008;
}

/// A send request: `privateMessage` event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPayload {
    pub sender: String,
    pub receiver: String,
    pub text: String,
}

/// A seen acknowledgement: `seenMessage` event data.
///
/// `receiver` is the acknowledger; `sender` is whose messages are being
/// marked seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenPayload {
    pub sender: String,
    pub receiver: String,
}

/// A message as pushed to clients: `newMessage` event data.
///
/// `status` is the push label, which for a live delivery to an online
/// receiver reads `delivered` even though the stored row still says `sent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
}

/// A seen notification: `messageSeen` event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenNotice {
    pub conversation_id: String,
}

/// An error pushed to a client: `error` event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable numeric code from [`codes`].
    pub code: u16,
    /// Human-readable description.
    pub message: String,
}

/// Events sent by clients to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Register this connection under an identity.
    #[serde(rename = "join")]
    Join(String),

    /// Send a private message.
    #[serde(rename = "privateMessage")]
    PrivateMessage(SendPayload),

    /// Acknowledge a conversation as seen.
    #[serde(rename = "seenMessage")]
    SeenMessage(SeenPayload),
}

/// Events pushed by the server to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A newly created message for one of the session's conversations.
    #[serde(rename = "newMessage")]
    NewMessage(MessagePayload),

    /// The peer acknowledged a conversation as seen.
    #[serde(rename = "messageSeen")]
    MessageSeen(SeenNotice),

    /// Full snapshot of currently online identities.
    #[serde(rename = "onlineUsers")]
    OnlineUsers(Vec<String>),

    /// A request was rejected.
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ClientEvent {
    /// Create a new `join` event.
    #[must_use]
    pub fn join(identity: impl Into<String>) -> Self {
        ClientEvent::Join(identity.into())
    }

    /// Create a new `privateMessage` event.
    #[must_use]
    pub fn private_message(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        ClientEvent::PrivateMessage(SendPayload {
            sender: sender.into(),
            receiver: receiver.into(),
            text: text.into(),
        })
    }

    /// Create a new `seenMessage` event.
    #[must_use]
    pub fn seen_message(sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        ClientEvent::SeenMessage(SeenPayload {
            sender: sender.into(),
            receiver: receiver.into(),
        })
    }
}

impl ServerEvent {
    /// Create a new `messageSeen` event.
    #[must_use]
    pub fn message_seen(conversation_id: impl Into<String>) -> Self {
        ServerEvent::MessageSeen(SeenNotice {
            conversation_id: conversation_id.into(),
        })
    }

    /// Create a new `onlineUsers` event.
    #[must_use]
    pub fn online_users(identities: Vec<String>) -> Self {
        ServerEvent::OnlineUsers(identities)
    }

    /// Create a new `error` event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }
}
