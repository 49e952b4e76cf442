//! Integration tests for the chunked transport over real TCP.
//!
//! Two endpoints on localhost exchange oversized payloads; the receiving
//! side must observe exactly the original messages, in order, with the
//! logical sender preserved.

use hashbreak_core::cluster::messages::Envelope;
use hashbreak_core::cluster::types::ActorPath;
use hashbreak_core::transport::{Router, Transport, endpoint};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

async fn receiver_node(
    actor: &str,
) -> (std::net::SocketAddr, mpsc::UnboundedReceiver<hashbreak_core::cluster::messages::Delivery>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let router = Router::default();
    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    router.register(actor, mailbox_tx).await;
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let addr = endpoint::bind("127.0.0.1:0", router, events_tx, shutdown.clone())
        .await
        .expect("endpoint should bind");
    (addr, mailbox_rx, shutdown)
}

fn sender_node(node_id: &str, frame_size: usize, shutdown: &CancellationToken) -> Arc<Transport> {
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    Arc::new(Transport::new(
        node_id.to_string(),
        frame_size,
        Router::default(),
        events_tx,
        shutdown.clone(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_payload_crosses_the_wire_intact() {
    let (addr, mut mailbox, shutdown) = receiver_node("sink").await;
    let transport = sender_node("node-a", 64, &shutdown);
    transport.connect_peer("node-b".to_string(), &addr.to_string()).await;

    // Far larger than one 64-byte frame.
    let payload = Envelope::HintHashes {
        hashes: (0..500).map(|i| format!("{i:0>64}")).collect(),
    };
    let sender = ActorPath::new("node-a", "coordinator");
    let receiver = ActorPath::new("node-b", "sink");
    transport
        .send(sender.clone(), receiver, payload.clone())
        .await
        .expect("send should succeed");

    let delivery = timeout(Duration::from_secs(10), mailbox.recv())
        .await
        .expect("delivery should arrive in time")
        .expect("mailbox open");
    assert_eq!(delivery.sender, sender);
    assert_eq!(delivery.envelope, payload);

    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_messages_arrive_in_send_order() {
    let (addr, mut mailbox, shutdown) = receiver_node("sink").await;
    // A tiny frame size forces every message through multiple chunks.
    let transport = sender_node("node-a", 16, &shutdown);
    transport.connect_peer("node-b".to_string(), &addr.to_string()).await;

    let sender = ActorPath::new("node-a", "coordinator");
    let receiver = ActorPath::new("node-b", "sink");
    for i in 0..20u32 {
        let envelope = Envelope::Collect {
            line: format!("message number {i} with some padding to span frames"),
        };
        transport
            .send(sender.clone(), receiver.clone(), envelope)
            .await
            .expect("send should succeed");
    }

    for i in 0..20u32 {
        let delivery = timeout(Duration::from_secs(10), mailbox.recv())
            .await
            .expect("delivery should arrive in time")
            .expect("mailbox open");
        match delivery.envelope {
            Envelope::Collect { line } => {
                assert!(
                    line.starts_with(&format!("message number {i} ")),
                    "expected message {i}, got {line:?}"
                );
            }
            other => panic!("unexpected envelope: {}", other.manifest()),
        }
    }

    shutdown.cancel();
}
