//! Typed WebSocket client for the Courier wire protocol.

use courier_protocol::{codec, ClientEvent, ProtocolError, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// WebSocket transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] WsError),

    /// Protocol encode/decode error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection is closed.
    #[error("Connection closed")]
    Closed,
}

/// A connected Courier client session, bound to one identity.
pub struct Client {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    identity: String,
}

impl Client {
    /// Connect to a Courier server and register under `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket handshake or the join send fails.
    pub async fn connect(url: &str, identity: &str) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(url).await?;
        debug!(url = %url, identity = %identity, "Connected");

        let mut client = Self {
            stream,
            identity: identity.to_string(),
        };
        client.send_event(&ClientEvent::join(identity)).await?;
        Ok(client)
    }

    /// The identity this session is bound to.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Send a private message to `receiver`.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn send(&mut self, receiver: &str, text: &str) -> Result<(), ClientError> {
        self.send_event(&ClientEvent::private_message(
            self.identity.clone(),
            receiver,
            text,
        ))
        .await
    }

    /// Acknowledge the conversation with `peer` as seen.
    ///
    /// `peer` is whose messages are being marked; this session's identity is
    /// the acknowledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn mark_seen(&mut self, peer: &str) -> Result<(), ClientError> {
        self.send_event(&ClientEvent::seen_message(peer, self.identity.clone()))
            .await
    }

    /// Receive the next server event.
    ///
    /// Returns `None` when the connection closes cleanly. Transport-level
    /// pings are answered internally; unparseable frames are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, ClientError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match codec::decode::<ServerEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => {
                        warn!(error = %e, "Skipping unparseable event");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    self.stream.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed)) => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    pub async fn close(mut self) -> Result<(), ClientError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), ClientError> {
        let text = codec::encode(event)?;
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }
}
