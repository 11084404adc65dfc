//! Conversation addressing for Courier.
//!
//! A conversation has no stored record of its own; it is a derived partition
//! key over an unordered pair of identities.

/// Maximum identity length in bytes.
pub const MAX_IDENTITY_LENGTH: usize = 64;

/// Separator between the two identities in a conversation id.
///
/// Excluded from the identity alphabet so two distinct unordered pairs can
/// never derive the same key.
pub const CONVERSATION_SEPARATOR: char = '_';

/// An opaque identity, externally owned and verified.
pub type Identity = String;

/// A derived conversation key.
pub type ConversationId = String;

/// Validate an identity.
///
/// # Errors
///
/// Returns an error message if the identity is invalid.
pub fn validate_identity(identity: &str) -> Result<(), &'static str> {
    if identity.is_empty() {
        return Err("Identity cannot be empty");
    }
    if identity.len() > MAX_IDENTITY_LENGTH {
        return Err("Identity too long");
    }
    if identity.contains(CONVERSATION_SEPARATOR) {
        return Err("Identity cannot contain '_'");
    }
    if !identity
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && c != ' ')
    {
        return Err("Identity contains invalid characters");
    }
    Ok(())
}

/// Derive the conversation id for a pair of identities.
///
/// Pure and commutative: `conversation_id(a, b) == conversation_id(b, a)`.
/// The two identities are sorted lexicographically and joined with `_`.
#[must_use]
pub fn conversation_id(a: &str, b: &str) -> ConversationId {
    if a <= b {
        format!("{a}{CONVERSATION_SEPARATOR}{b}")
    } else {
        format!("{b}{CONVERSATION_SEPARATOR}{a}")
    }
}
