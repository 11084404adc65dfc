//! Delivery status vocabulary for Courier messages.
//!
//! Every message moves forward through `sent` → `delivered` → `seen` and
//! never backwards. `delivered` only ever appears as a label on a live push
//! to an online receiver; stored rows hold `sent` until a seen
//! acknowledgement sweeps them to `seen`.

use serde::{Deserialize, Serialize};

/// Delivery status of a message.
///
/// The variants are totally ordered: `Sent < Delivered < Seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Persisted, not yet acknowledged by the receiver.
    Sent,
    /// Pushed to an online receiver (transient push label only).
    Delivered,
    /// Acknowledged as read by the receiver.
    Seen,
}

impl DeliveryStatus {
    /// Advance to a later status.
    ///
    /// Returns `true` if the status changed. Requesting a transition to a
    /// status at or behind the current one is a no-op, never an error.
    pub fn advance(&mut self, to: DeliveryStatus) -> bool {
        if to > *self {
            *self = to;
            true
        } else {
            false
        }
    }

    /// Get the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Seen => "seen",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
