//! Presence tracking for Courier.
//!
//! The registry maps each identity to its set of live connection handles.
//! An identity is online while at least one handle is registered; the
//! offline↔online edges are what drive presence broadcasts.

use crate::conversation::Identity;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;

/// Process-wide registry of online identities.
///
/// All mutations go through one mutex so racing connect/disconnect events
/// for the same identity serialize, and the snapshot returned on an edge is
/// computed inside the critical section. Nothing awaits while the lock is
/// held.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: Mutex<HashMap<Identity, HashSet<String>>>,
}

impl PresenceRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection handle under an identity.
    ///
    /// Returns the updated global online snapshot if this was the identity's
    /// first handle (the offline→online edge), `None` otherwise. Registering
    /// the same handle twice is a no-op.
    pub fn register(&self, identity: &str, connection_id: &str) -> Option<Vec<Identity>> {
        let mut connections = self.connections.lock().unwrap();
        let handles = connections.entry(identity.to_string()).or_default();
        let was_offline = handles.is_empty();
        handles.insert(connection_id.to_string());

        if was_offline {
            debug!(identity = %identity, "Identity online");
            Some(connections.keys().cloned().collect())
        } else {
            None
        }
    }

    /// Remove a connection handle from an identity.
    ///
    /// Returns the updated global online snapshot if this was the identity's
    /// last handle (the online→offline edge), `None` otherwise. Unknown
    /// identities or handles are no-ops.
    pub fn unregister(&self, identity: &str, connection_id: &str) -> Option<Vec<Identity>> {
        let mut connections = self.connections.lock().unwrap();
        let Some(handles) = connections.get_mut(identity) else {
            return None;
        };
        if !handles.remove(connection_id) {
            return None;
        }

        if handles.is_empty() {
            connections.remove(identity);
            debug!(identity = %identity, "Identity offline");
            Some(connections.keys().cloned().collect())
        } else {
            None
        }
    }

    /// Check whether an identity has at least one live connection.
    #[must_use]
    pub fn is_online(&self, identity: &str) -> bool {
        self.connections
            .lock()
            .unwrap()
            .get(identity)
            .is_some_and(|handles| !handles.is_empty())
    }

    /// Get a copy of all currently online identities.
    ///
    /// The copy does not stay current.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Identity> {
        self.connections.lock().unwrap().keys().cloned().collect()
    }

    /// Number of currently online identities.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}
