//! End-to-end delivery soak for Courier.
//!
//! Measures sustained sender→receiver delivery rate over real WebSocket
//! connections against a running server.

use courier_client::{Client, ServerEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SERVER_URL: &str = "ws://127.0.0.1:5000/ws";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           Courier End-to-End Delivery Soak                   ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the server is running: cargo run --release        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let delivered = Arc::new(AtomicU64::new(0));
    let sent = Arc::new(AtomicU64::new(0));

    // Receiver: count delivered pushes.
    let recv_count = Arc::clone(&delivered);
    let receiver = tokio::spawn(async move {
        let mut bob = Client::connect(SERVER_URL, "bob")
            .await
            .expect("receiver connect failed");
        while let Ok(Some(event)) = bob.next_event().await {
            if matches!(event, ServerEvent::NewMessage(_)) {
                recv_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    // Sender: blast messages, draining its own echoes.
    let send_count = Arc::clone(&sent);
    let sender = tokio::spawn(async move {
        let mut alice = Client::connect(SERVER_URL, "alice")
            .await
            .expect("sender connect failed");
        loop {
            if alice.send("bob", "soak payload").await.is_err() {
                break;
            }
            send_count.fetch_add(1, Ordering::Relaxed);
            // Drain the sent echo so the socket buffer never fills.
            if alice.next_event().await.is_err() {
                break;
            }
        }
    });

    println!("⏳ Warming up for {WARMUP_SECS}s...");
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    delivered.store(0, Ordering::SeqCst);
    sent.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {BENCH_SECS}s...");
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_sent = sent.load(Ordering::SeqCst);
    let total_delivered = delivered.load(Ordering::SeqCst);

    sender.abort();
    receiver.abort();

    let sent_per_sec = total_sent as f64 / elapsed.as_secs_f64();
    let delivered_per_sec = total_delivered as f64 / elapsed.as_secs_f64();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Sent:                 {:>10}                           ║",
        total_sent
    );
    println!(
        "║  Delivered:            {:>10}                           ║",
        total_delivered
    );
    println!(
        "║  Send rate:            {:>10.0} msg/s                    ║",
        sent_per_sec
    );
    println!(
        "║  Delivery rate:        {:>10.0} msg/s                    ║",
        delivered_per_sec
    );
    println!("╚══════════════════════════════════════════════════════════════╝");
}
