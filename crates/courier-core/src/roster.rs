//! Per-identity session mailboxes.
//!
//! Each identity has one broadcast channel; every connection for that
//! identity (multiple devices, tabs) binds a receiver on it. Pushes are
//! best-effort and at-most-once: durable delivery is the store's job.

use crate::conversation::Identity;
use courier_protocol::ServerEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default mailbox capacity.
const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// The set of live session mailboxes, keyed by identity.
#[derive(Debug)]
pub struct Roster {
    mailboxes: DashMap<Identity, broadcast::Sender<Arc<ServerEvent>>>,
    capacity: usize,
}

impl Roster {
    /// Create a roster with the default mailbox capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    /// Create a roster with a specific per-mailbox capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            mailboxes: DashMap::new(),
            capacity,
        }
    }

    /// Bind a receiver on an identity's mailbox, creating it if absent.
    ///
    /// Connections for the same identity share the sender, so each receives
    /// every event addressed to the identity.
    pub fn bind(&self, identity: &str) -> broadcast::Receiver<Arc<ServerEvent>> {
        let entry = self
            .mailboxes
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(identity = %identity, "Creating mailbox");
                broadcast::channel(self.capacity).0
            });
        entry.subscribe()
    }

    /// Push an event to one identity's mailbox.
    ///
    /// Returns the number of receivers it reached; 0 if the identity has no
    /// mailbox or no live receivers. Failed pushes are dropped, never
    /// retried.
    pub fn push(&self, identity: &str, event: ServerEvent) -> usize {
        let Some(sender) = self.mailboxes.get(identity) else {
            trace!(identity = %identity, "Push to absent mailbox");
            return 0;
        };
        let count = sender.send(Arc::new(event)).unwrap_or_default();
        trace!(identity = %identity, recipients = count, "Pushed event");
        count
    }

    /// Push an event to every mailbox.
    ///
    /// Returns the total number of receivers reached.
    pub fn push_all(&self, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        self.mailboxes
            .iter()
            .map(|entry| entry.send(Arc::clone(&event)).unwrap_or_default())
            .sum()
    }

    /// Drop an identity's mailbox if it has no live receivers.
    ///
    /// Returns `true` if the mailbox was removed.
    pub fn prune(&self, identity: &str) -> bool {
        let removed = self
            .mailboxes
            .remove_if(identity, |_, sender| sender.receiver_count() == 0)
            .is_some();
        if removed {
            debug!(identity = %identity, "Pruned empty mailbox");
        }
        removed
    }

    /// Number of live mailboxes.
    #[must_use]
    pub fn mailbox_count(&self) -> usize {
        self.mailboxes.len()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}
