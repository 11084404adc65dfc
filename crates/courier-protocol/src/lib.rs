//! # courier-protocol
//!
//! Wire protocol definitions for the Courier message-delivery engine.
//!
//! This crate defines the JSON event protocol exchanged between Courier
//! clients and servers, the delivery-status vocabulary, and the codec.
//!
//! ## Events
//!
//! - `join` - bind a connection to an identity
//! - `privateMessage` / `newMessage` - send and receive messages
//! - `seenMessage` / `messageSeen` - read acknowledgements
//! - `onlineUsers` - presence snapshots
//! - `error` - request rejections
//!
//! ## Example
//!
//! ```rust
//! use courier_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::private_message("alice", "bob", "hello");
//!
//! let encoded = codec::encode(&event).unwrap();
//! let decoded: ClientEvent = codec::decode(&encoded).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod events;
pub mod status;

pub use codec::{decode, encode, ProtocolError, MAX_EVENT_SIZE};
pub use events::{
    ClientEvent, ErrorPayload, MessagePayload, SeenNotice, SeenPayload, SendPayload, ServerEvent,
};
pub use status::DeliveryStatus;
