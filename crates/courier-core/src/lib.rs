//! # courier-core
//!
//! Core types and message delivery for the Courier engine.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Conversation** - derived, order-independent conversation keys
//! - **MessageStore** - durable append-only messages with delivery status
//! - **PresenceRegistry** - process-wide online set
//! - **Roster** - per-identity session mailboxes
//! - **DeliveryRouter** - routes sends, seen acks, and presence broadcasts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Connection │────▶│  DeliveryRouter │────▶│   Roster    │
//! └─────────────┘     └─────────────────┘     └─────────────┘
//!                        │           │
//!                        ▼           ▼
//!                 ┌───────────┐ ┌──────────────────┐
//!                 │   Store   │ │ PresenceRegistry │
//!                 └───────────┘ └──────────────────┘
//! ```

pub mod conversation;
pub mod message;
pub mod presence;
pub mod roster;
pub mod router;
pub mod store;

pub use conversation::{conversation_id, validate_identity, ConversationId, Identity};
pub use message::Message;
pub use presence::PresenceRegistry;
pub use roster::Roster;
pub use router::{
    AllowAll, DeliveryRouter, ExchangePolicy, RouterConfig, RouterError, RouterStats,
};
pub use store::{MemoryStore, MessageStore, StoreError};
