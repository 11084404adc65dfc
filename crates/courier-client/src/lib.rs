//! # courier-client
//!
//! Typed WebSocket client for the Courier message-delivery engine.
//!
//! Used by the server's integration tests and the delivery soak binary;
//! also a reference for how deployed clients speak the protocol.
//!
//! ## Example
//!
//! ```rust,no_run
//! use courier_client::Client;
//!
//! # async fn example() -> Result<(), courier_client::ClientError> {
//! let mut client = Client::connect("ws://127.0.0.1:5000/ws", "alice").await?;
//! client.send("bob", "hello").await?;
//! while let Some(event) = client.next_event().await? {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{Client, ClientError};
pub use courier_protocol::{ClientEvent, DeliveryStatus, MessagePayload, ServerEvent};
