//! End-to-end delivery tests against a real server.
//!
//! Each test binds an ephemeral port and drives the full stack over
//! WebSocket via `courier-client`, plus the HTTP history endpoint.

use async_trait::async_trait;
use courier_client::{Client, DeliveryStatus, ServerEvent};
use courier_core::{ExchangePolicy, MemoryStore};
use courier_protocol::events::codes;
use courier_server::config::{Config, MetricsConfig};
use courier_server::{serve, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct DenyAll;

#[async_trait]
impl ExchangePolicy for DenyAll {
    async fn can_exchange(&self, _a: &str, _b: &str) -> bool {
        false
    }
}

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        metrics: MetricsConfig {
            enabled: false,
            port: 0,
        },
        ..Config::default()
    }
}

async fn start_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::new(state)));
    addr
}

async fn start_default_server() -> SocketAddr {
    start_server(AppState::new(test_config())).await
}

async fn connect(addr: SocketAddr, identity: &str) -> Client {
    Client::connect(&format!("ws://{addr}/ws"), identity)
        .await
        .unwrap()
}

/// Wait for the next event matching the predicate, skipping others.
async fn expect_event<F>(client: &mut Client, mut pred: F) -> ServerEvent
where
    F: FnMut(&ServerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = client
                .next_event()
                .await
                .unwrap()
                .expect("connection closed while waiting for event");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Wait until the client observes an online set containing `identity`.
async fn wait_online(client: &mut Client, identity: &str) {
    expect_event(client, |event| {
        matches!(event, ServerEvent::OnlineUsers(online) if online.iter().any(|i| i == identity))
    })
    .await;
}

/// Fetch the health endpoint over HTTP.
async fn fetch_health(addr: SocketAddr) -> serde_json::Value {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request =
        format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .expect("malformed HTTP response")
        .1;
    serde_json::from_str(body).unwrap()
}

/// Fetch the conversation history over HTTP.
async fn fetch_history(addr: SocketAddr, me: &str, peer: &str) -> serde_json::Value {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /api/messages/{peer}?identity={me} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .expect("malformed HTTP response")
        .1;
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn online_receiver_gets_delivered_label() {
    let addr = start_default_server().await;

    let mut alice = connect(addr, "alice").await;
    wait_online(&mut alice, "alice").await;
    let mut bob = connect(addr, "bob").await;
    wait_online(&mut alice, "bob").await;

    alice.send("bob", "hi").await.unwrap();

    // Sender sees the server-confirmed echo labeled sent.
    let echo = expect_event(&mut alice, |e| matches!(e, ServerEvent::NewMessage(_))).await;
    let ServerEvent::NewMessage(echo) = echo else {
        unreachable!()
    };
    assert_eq!(echo.status, DeliveryStatus::Sent);
    assert_eq!(echo.conversation_id, "alice_bob");

    // Online receiver sees the same message labeled delivered.
    let push = expect_event(&mut bob, |e| matches!(e, ServerEvent::NewMessage(_))).await;
    let ServerEvent::NewMessage(push) = push else {
        unreachable!()
    };
    assert_eq!(push.status, DeliveryStatus::Delivered);
    assert_eq!(push.text, "hi");

    // The stored row stays sent: delivered is a push label only.
    let history = fetch_history(addr, "bob", "alice").await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "sent");
}

#[tokio::test]
async fn seen_ack_notifies_sender_and_persists() {
    let addr = start_default_server().await;

    let mut alice = connect(addr, "alice").await;
    wait_online(&mut alice, "alice").await;
    let mut bob = connect(addr, "bob").await;
    wait_online(&mut alice, "bob").await;

    alice.send("bob", "hi").await.unwrap();
    expect_event(&mut bob, |e| matches!(e, ServerEvent::NewMessage(_))).await;

    bob.mark_seen("alice").await.unwrap();

    let notice = expect_event(&mut alice, |e| matches!(e, ServerEvent::MessageSeen(_))).await;
    let ServerEvent::MessageSeen(notice) = notice else {
        unreachable!()
    };
    assert_eq!(notice.conversation_id, "alice_bob");

    let history = fetch_history(addr, "alice", "bob").await;
    assert_eq!(history[0]["status"], "seen");
}

#[tokio::test]
async fn offline_receiver_loads_pending_messages() {
    let addr = start_default_server().await;

    let mut alice = connect(addr, "alice").await;
    wait_online(&mut alice, "alice").await;

    alice.send("bob", "are you there?").await.unwrap();
    expect_event(&mut alice, |e| matches!(e, ServerEvent::NewMessage(_))).await;

    // No push happened; the message waits in the store.
    let history = fetch_history(addr, "bob", "alice").await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "sent");
    assert_eq!(history[0]["text"], "are you there?");

    // Bob connects later and the seen flow proceeds as usual.
    let mut bob = connect(addr, "bob").await;
    wait_online(&mut bob, "bob").await;
    bob.mark_seen("alice").await.unwrap();

    let notice = expect_event(&mut alice, |e| matches!(e, ServerEvent::MessageSeen(_))).await;
    assert!(matches!(notice, ServerEvent::MessageSeen(n) if n.conversation_id == "alice_bob"));

    let history = fetch_history(addr, "bob", "alice").await;
    assert_eq!(history[0]["status"], "seen");
}

#[tokio::test]
async fn unauthorized_pair_is_rejected_without_side_effects() {
    let state = AppState::with_parts(
        test_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(DenyAll),
    );
    let addr = start_server(state).await;

    let mut alice = connect(addr, "alice").await;
    wait_online(&mut alice, "alice").await;

    alice.send("bob", "hi").await.unwrap();

    let event = expect_event(&mut alice, |e| matches!(e, ServerEvent::Error(_))).await;
    let ServerEvent::Error(error) = event else {
        unreachable!()
    };
    assert_eq!(error.code, codes::UNAUTHORIZED);

    // No store row was created.
    let history = fetch_history(addr, "alice", "bob").await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn presence_broadcast_follows_connect_and_disconnect() {
    let addr = start_default_server().await;

    let mut alice = connect(addr, "alice").await;
    wait_online(&mut alice, "alice").await;

    let bob = connect(addr, "bob").await;
    wait_online(&mut alice, "bob").await;

    bob.close().await.unwrap();
    expect_event(&mut alice, |event| {
        matches!(event, ServerEvent::OnlineUsers(online) if !online.iter().any(|i| i == "bob"))
    })
    .await;
}

#[tokio::test]
async fn disconnect_prunes_identity_mailbox() {
    let addr = start_default_server().await;

    let mut alice = connect(addr, "alice").await;
    wait_online(&mut alice, "alice").await;

    let bob = connect(addr, "bob").await;
    wait_online(&mut alice, "bob").await;

    let health = fetch_health(addr).await;
    assert_eq!(health["online"], 2);
    assert_eq!(health["mailboxes"], 2);

    bob.close().await.unwrap();
    expect_event(&mut alice, |event| {
        matches!(event, ServerEvent::OnlineUsers(online) if !online.iter().any(|i| i == "bob"))
    })
    .await;

    // The handler drops its receiver before disconnecting, so bob's mailbox
    // must be gone, not just his presence entry.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let health = fetch_health(addr).await;
        if health["mailboxes"] == 1 {
            assert_eq!(health["online"], 1);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "mailbox not pruned after disconnect: {health}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn devices_of_one_identity_share_deliveries() {
    let addr = start_default_server().await;

    let mut alice = connect(addr, "alice").await;
    wait_online(&mut alice, "alice").await;

    let mut bob_phone = connect(addr, "bob").await;
    wait_online(&mut alice, "bob").await;
    let mut bob_laptop = connect(addr, "bob").await;
    wait_online(&mut bob_laptop, "bob").await;

    alice.send("bob", "hi").await.unwrap();

    for device in [&mut bob_phone, &mut bob_laptop] {
        let push = expect_event(device, |e| matches!(e, ServerEvent::NewMessage(_))).await;
        let ServerEvent::NewMessage(push) = push else {
            unreachable!()
        };
        assert_eq!(push.status, DeliveryStatus::Delivered);
    }
}

#[tokio::test]
async fn history_rejects_invalid_identity() {
    let addr = start_default_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /api/messages/bob?identity=bad_name HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 400"));
}
