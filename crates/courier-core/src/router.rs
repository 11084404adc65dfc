//! Message delivery router for Courier.
//!
//! The router owns the presence registry and the session roster, persists
//! through the message store, and enforces the externally supplied
//! authorization predicate before any side effect.

use crate::conversation::{conversation_id, validate_identity};
use crate::message::Message;
use crate::presence::PresenceRegistry;
use crate::roster::Roster;
use crate::store::{MessageStore, StoreError};
use async_trait::async_trait;
use courier_protocol::{DeliveryStatus, ServerEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// An identity failed validation.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(&'static str),

    /// Message text was empty.
    #[error("Message text cannot be empty")]
    EmptyText,

    /// The pair is not permitted to exchange messages.
    #[error("{sender} and {receiver} are not permitted to exchange messages")]
    Unauthorized { sender: String, receiver: String },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The externally owned "may these two parties exchange messages" predicate.
///
/// The social-graph collaborator implements this; the router checks it
/// before any store mutation or push.
#[async_trait]
pub trait ExchangePolicy: Send + Sync {
    async fn can_exchange(&self, a: &str, b: &str) -> bool;
}

/// Policy for deployments that authorize upstream of the router.
#[derive(Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl ExchangePolicy for AllowAll {
    async fn can_exchange(&self, _a: &str, _b: &str) -> bool {
        true
    }
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-identity mailbox capacity.
    pub mailbox_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
        }
    }
}

/// The central delivery router.
///
/// Constructed once at process start and injected into every connection
/// handler; it holds no global state.
pub struct DeliveryRouter {
    store: Arc<dyn MessageStore>,
    policy: Arc<dyn ExchangePolicy>,
    presence: PresenceRegistry,
    roster: Roster,
}

impl DeliveryRouter {
    /// Create a router with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, policy: Arc<dyn ExchangePolicy>) -> Self {
        Self::with_config(store, policy, RouterConfig::default())
    }

    /// Create a router with custom configuration.
    #[must_use]
    pub fn with_config(
        store: Arc<dyn MessageStore>,
        policy: Arc<dyn ExchangePolicy>,
        config: RouterConfig,
    ) -> Self {
        info!("Creating delivery router with config: {:?}", config);
        Self {
            store,
            policy,
            presence: PresenceRegistry::new(),
            roster: Roster::with_capacity(config.mailbox_capacity),
        }
    }

    /// Register a connection for an identity.
    ///
    /// Binds a receiver on the identity's mailbox and registers presence.
    /// On the offline→online edge the updated online set is broadcast to
    /// every connected channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is invalid.
    pub fn connect(
        &self,
        identity: &str,
        connection_id: &str,
    ) -> Result<broadcast::Receiver<Arc<ServerEvent>>, RouterError> {
        validate_identity(identity).map_err(RouterError::InvalidIdentity)?;

        // Bind before registering so the edge broadcast reaches this
        // connection too.
        let receiver = self.roster.bind(identity);
        if let Some(online) = self.presence.register(identity, connection_id) {
            self.broadcast_presence(online);
        }

        debug!(identity = %identity, connection = %connection_id, "Connected");
        Ok(receiver)
    }

    /// Unregister a connection for an identity.
    ///
    /// Invoked promptly on transport-level disconnect. On the online→offline
    /// edge the updated online set is broadcast; the mailbox is pruned once
    /// its last receiver is gone.
    pub fn disconnect(&self, identity: &str, connection_id: &str) {
        if let Some(online) = self.presence.unregister(identity, connection_id) {
            self.broadcast_presence(online);
        }
        self.roster.prune(identity);

        debug!(identity = %identity, connection = %connection_id, "Disconnected");
    }

    /// Route a private message.
    ///
    /// Persist-then-push, all-or-nothing: authorization and store failures
    /// abort before any push. The sender's channel gets the stored record
    /// labeled `sent`; the receiver's channel gets it labeled `delivered`
    /// only while the receiver is online. The stored row stays `sent`
    /// either way — `delivered` is a transient push label, not a persisted
    /// state.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input, a false authorization predicate,
    /// or store failure.
    pub async fn send(
        &self,
        sender: &str,
        receiver: &str,
        text: &str,
    ) -> Result<Message, RouterError> {
        validate_identity(sender).map_err(RouterError::InvalidIdentity)?;
        validate_identity(receiver).map_err(RouterError::InvalidIdentity)?;
        if text.trim().is_empty() {
            return Err(RouterError::EmptyText);
        }

        if !self.policy.can_exchange(sender, receiver).await {
            warn!(sender = %sender, receiver = %receiver, "Send rejected by exchange policy");
            return Err(RouterError::Unauthorized {
                sender: sender.to_string(),
                receiver: receiver.to_string(),
            });
        }

        let message = self.store.append(sender, receiver, text).await?;

        // Server-confirmed echo to the sender's own sessions.
        let echoed = self
            .roster
            .push(sender, ServerEvent::NewMessage(message.wire(DeliveryStatus::Sent)));
        if echoed == 0 {
            trace!(sender = %sender, "No live sender session for echo");
        }

        if self.presence.is_online(receiver) {
            let pushed = self.roster.push(
                receiver,
                ServerEvent::NewMessage(message.wire(DeliveryStatus::Delivered)),
            );
            debug!(
                conversation = %message.conversation_id,
                recipients = pushed,
                "Delivered live"
            );
        } else {
            trace!(
                conversation = %message.conversation_id,
                "Receiver offline, message pending next load"
            );
        }

        Ok(message)
    }

    /// Mark every message from `sender` to `receiver` in their conversation
    /// as seen.
    ///
    /// `receiver` is the acknowledger. When any row changed, the original
    /// sender's channel is notified; the acknowledger gets no echo.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input or store failure.
    pub async fn mark_seen(&self, sender: &str, receiver: &str) -> Result<u64, RouterError> {
        validate_identity(sender).map_err(RouterError::InvalidIdentity)?;
        validate_identity(receiver).map_err(RouterError::InvalidIdentity)?;

        let conversation = conversation_id(sender, receiver);
        let changed = self.store.mark_seen(&conversation, receiver).await?;

        if changed > 0 {
            self.roster
                .push(sender, ServerEvent::message_seen(conversation.clone()));
            debug!(conversation = %conversation, rows = changed, "Seen acknowledged");
        }

        Ok(changed)
    }

    /// Load the conversation history between two identities, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input or store failure.
    pub async fn conversation(&self, a: &str, b: &str) -> Result<Vec<Message>, RouterError> {
        validate_identity(a).map_err(RouterError::InvalidIdentity)?;
        validate_identity(b).map_err(RouterError::InvalidIdentity)?;

        Ok(self.store.list(&conversation_id(a, b)).await?)
    }

    /// Push the full online set to every connected channel.
    ///
    /// Non-incremental; fine while the online set stays small.
    fn broadcast_presence(&self, online: Vec<String>) {
        let reached = self.roster.push_all(ServerEvent::online_users(online));
        trace!(recipients = reached, "Broadcast presence");
    }

    /// Check whether an identity is online.
    #[must_use]
    pub fn is_online(&self, identity: &str) -> bool {
        self.presence.is_online(identity)
    }

    /// Get a copy of the current online set.
    #[must_use]
    pub fn online_snapshot(&self) -> Vec<String> {
        self.presence.snapshot()
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            online_identities: self.presence.online_count(),
            mailboxes: self.roster.mailbox_count(),
        }
    }
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Identities with at least one live connection.
    pub online_identities: usize,
    /// Live session mailboxes.
    pub mailboxes: usize,
}
