//! Connection handlers for the Courier server.
//!
//! This module handles the connection lifecycle: the `join` handshake, the
//! per-connection event loop, and the conversation history endpoint.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use courier_core::{
    AllowAll, DeliveryRouter, ExchangePolicy, MemoryStore, MessageStore, RouterConfig, RouterError,
    StoreError,
};
use courier_protocol::{codec, events::codes, ClientEvent, MessagePayload, ServerEvent};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Shared server state, built once at startup and injected into handlers.
pub struct AppState {
    /// The delivery router.
    pub router: DeliveryRouter,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state with the in-memory store and an allow-all policy.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, Arc::new(MemoryStore::new()), Arc::new(AllowAll))
    }

    /// Create app state with explicit store and policy collaborators.
    #[must_use]
    pub fn with_parts(
        config: Config,
        store: Arc<dyn MessageStore>,
        policy: Arc<dyn ExchangePolicy>,
    ) -> Self {
        let router_config = RouterConfig {
            mailbox_capacity: config.limits.mailbox_capacity,
        };

        Self {
            router: DeliveryRouter::with_config(store, policy, router_config),
            config,
        }
    }
}

/// Build the HTTP/WebSocket application.
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    let ws_path = state.config.ws_path.clone();
    Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/api/messages/:peer", get(history_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Courier server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, config.ws_path);

    let state = Arc::new(AppState::new(config));
    serve(listener, state).await
}

/// Serve on an already-bound listener.
///
/// Split from [`run_server`] so tests can bind port 0 and learn the local
/// address before serving.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.router.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "online": stats.online_identities,
        "mailboxes": stats.mailboxes,
    }))
}

/// Query parameters for the history endpoint.
///
/// `identity` is the requester, as verified by the authentication
/// collaborator in front of this server.
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    identity: String,
}

/// Conversation history handler: `GET /api/messages/{peer}?identity={me}`.
///
/// Returns all messages of the derived conversation, oldest first, with
/// their stored statuses. Used for the initial conversation load.
async fn history_handler(
    Path(peer): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.router.conversation(&query.identity, &peer).await {
        Ok(messages) => {
            let wire: Vec<MessagePayload> = messages.iter().map(|m| m.wire(m.status)).collect();
            Json(wire).into_response()
        }
        Err(err @ RouterError::InvalidIdentity(_)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "History load failed");
            metrics::record_error("history");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "Failed to load messages" })),
            )
                .into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Allocate a process-unique connection handle.
///
/// Two simultaneous connections for the same identity must never share a
/// handle, or one disconnect would take both out of the presence registry.
fn next_connection_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!("conn_{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = next_connection_id();

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // The first event must be `join`; nothing is routed before it.
    let Some(identity) = await_join(&mut sender, &mut receiver, &connection_id).await else {
        debug!(connection = %connection_id, "Closed before join");
        return;
    };

    let mut mailbox = match state.router.connect(&identity, &connection_id) {
        Ok(mailbox) => mailbox,
        Err(err) => {
            warn!(connection = %connection_id, error = %err, "Join rejected");
            metrics::record_error("join");
            let _ = send_event(&mut sender, &error_event(&err)).await;
            return;
        }
    };

    debug!(connection = %connection_id, identity = %identity, "Joined");
    metrics::set_online_identities(state.router.stats().online_identities);

    // The presence broadcast only fires on the offline→online edge, so a
    // second device would otherwise never learn the current set.
    let snapshot = ServerEvent::online_users(state.router.online_snapshot());
    if send_event(&mut sender, &snapshot).await.is_err() {
        drop(mailbox);
        state.router.disconnect(&identity, &connection_id);
        return;
    }

    // Event loop: forward mailbox pushes out, dispatch client events in.
    loop {
        tokio::select! {
            biased;

            event = mailbox.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Best-effort push: dropped events are recoverable
                        // from the store on the next conversation load.
                        warn!(connection = %connection_id, skipped, "Mailbox lagged");
                        metrics::record_error("lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_event(&text, &identity, &state, &mut sender).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_) | Message::Binary(_))) => {
                        // Binary frames are not part of the protocol.
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Transport-level disconnect: presence must follow promptly. The
    // receiver must be gone before disconnect, or prune sees it as live
    // and the mailbox leaks.
    drop(mailbox);
    state.router.disconnect(&identity, &connection_id);
    metrics::set_online_identities(state.router.stats().online_identities);

    debug!(connection = %connection_id, identity = %identity, "WebSocket disconnected");
}

/// Wait for the `join` event that binds this connection to an identity.
///
/// Returns `None` if the connection closes first.
async fn await_join(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    connection_id: &str,
) -> Option<String> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match codec::decode::<ClientEvent>(&text) {
                Ok(ClientEvent::Join(identity)) => return Some(identity),
                Ok(_) => {
                    warn!(connection = %connection_id, "Event before join");
                    let event = ServerEvent::error(codes::NOT_JOINED, "Join first");
                    if send_event(sender, &event).await.is_err() {
                        return None;
                    }
                }
                Err(e) => {
                    debug!(connection = %connection_id, error = %e, "Malformed event");
                    let event = ServerEvent::error(codes::MALFORMED_EVENT, "Malformed event");
                    if send_event(sender, &event).await.is_err() {
                        return None;
                    }
                }
            },
            Ok(Message::Ping(data)) => {
                if sender.send(Message::Pong(data)).await.is_err() {
                    return None;
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

/// Dispatch one client event from a joined connection.
async fn handle_client_event(
    text: &str,
    identity: &str,
    state: &Arc<AppState>,
    sender: &mut SplitSink<WebSocket, Message>,
) {
    let event = match codec::decode::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(identity = %identity, error = %e, "Malformed event");
            metrics::record_error("malformed");
            let event = ServerEvent::error(codes::MALFORMED_EVENT, "Malformed event");
            let _ = send_event(sender, &event).await;
            return;
        }
    };

    match event {
        ClientEvent::PrivateMessage(payload) => {
            // The session only speaks for its bound identity.
            if payload.sender != identity {
                warn!(identity = %identity, claimed = %payload.sender, "Sender mismatch");
                metrics::record_error("spoof");
                let event =
                    ServerEvent::error(codes::IDENTITY_MISMATCH, "Sender must match session");
                let _ = send_event(sender, &event).await;
                return;
            }
            if payload.text.len() > state.config.limits.max_text_bytes {
                let event = ServerEvent::error(codes::MESSAGE_TOO_LARGE, "Message too large");
                let _ = send_event(sender, &event).await;
                return;
            }

            match state
                .router
                .send(&payload.sender, &payload.receiver, &payload.text)
                .await
            {
                Ok(message) => {
                    metrics::record_message("inbound");
                    if state.router.is_online(&message.receiver) {
                        metrics::record_delivered_push();
                    }
                }
                Err(err) => {
                    warn!(identity = %identity, error = %err, "Send failed");
                    metrics::record_error("send");
                    let _ = send_event(sender, &error_event(&err)).await;
                }
            }
        }

        ClientEvent::SeenMessage(payload) => {
            if payload.receiver != identity {
                warn!(identity = %identity, claimed = %payload.receiver, "Acknowledger mismatch");
                metrics::record_error("spoof");
                let event =
                    ServerEvent::error(codes::IDENTITY_MISMATCH, "Receiver must match session");
                let _ = send_event(sender, &event).await;
                return;
            }

            match state
                .router
                .mark_seen(&payload.sender, &payload.receiver)
                .await
            {
                Ok(rows) => metrics::record_seen_sweep(rows),
                Err(err) => {
                    warn!(identity = %identity, error = %err, "Seen ack failed");
                    metrics::record_error("seen");
                    let _ = send_event(sender, &error_event(&err)).await;
                }
            }
        }

        ClientEvent::Join(_) => {
            // Already joined; ignore.
            debug!(identity = %identity, "Duplicate join ignored");
        }
    }
}

/// Map a router error to a wire `error` event with a stable code.
fn error_event(err: &RouterError) -> ServerEvent {
    let code = match err {
        RouterError::InvalidIdentity(_) => codes::INVALID_IDENTITY,
        RouterError::EmptyText => codes::EMPTY_TEXT,
        RouterError::Unauthorized { .. } => codes::UNAUTHORIZED,
        RouterError::Store(StoreError::EmptyText) => codes::EMPTY_TEXT,
        RouterError::Store(StoreError::InvalidIdentity(_)) => codes::INVALID_IDENTITY,
        RouterError::Store(StoreError::Unavailable(_)) => codes::STORE_UNAVAILABLE,
    };
    ServerEvent::error(code, err.to_string())
}

/// Send an event to the WebSocket.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<()> {
    let text = codec::encode(event)?;
    metrics::record_message("outbound");
    sender.send(Message::Text(text)).await?;
    Ok(())
}
