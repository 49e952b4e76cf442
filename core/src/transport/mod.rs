//! Chunked large-message transport.
//!
//! [`Transport::send`] is the single entry point for all cluster traffic.
//! Payloads addressed to a co-resident actor are routed straight into its
//! mailbox; everything else is serialized with a self-describing codec,
//! split into bounded frames, and written over the ordered connection to
//! the destination node, where the remote endpoint reassembles and
//! delivers it with the original logical provenance.
//!
//! There is no acknowledgement and no retransmission: a lost frame stalls
//! its transfer silently, and the sender is never told.

pub mod chunk;
pub mod codec;
pub mod endpoint;
pub mod peer;

use crate::cluster::messages::{Delivery, Envelope};
use crate::cluster::types::{ActorPath, NodeId};
use hashbreak_common::{ClusterError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use chunk::{Chunk, Reassembler};
pub use codec::SerializerId;
pub use peer::PeerHandle;

/// Connection-level notifications consumed by the membership layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The ordered channel to or from a node failed or closed
    PeerClosed { node: NodeId },
}

/// Routes completed messages to the mailboxes of co-resident actors.
#[derive(Clone, Default)]
pub struct Router {
    actors: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>>,
}

impl Router {
    /// Register a local actor's mailbox under its well-known name.
    pub async fn register(&self, actor: impl Into<String>, mailbox: mpsc::UnboundedSender<Delivery>) {
        self.actors.lock().await.insert(actor.into(), mailbox);
    }

    /// Deliver to a local actor. Unknown or stopped destinations are
    /// logged and dropped, never an error.
    pub async fn deliver(&self, receiver: &ActorPath, delivery: Delivery) {
        let actors = self.actors.lock().await;
        match actors.get(&receiver.actor) {
            Some(mailbox) => {
                if mailbox.send(delivery).is_err() {
                    warn!("dropping message for stopped actor {}", receiver);
                }
            }
            None => warn!(
                "dropping {} for unknown actor {}",
                delivery.envelope.manifest(),
                receiver
            ),
        }
    }
}

/// The node-local transport: local routing plus chunked remote sends.
pub struct Transport {
    node_id: NodeId,
    frame_size: usize,
    router: Router,
    peers: Mutex<HashMap<NodeId, PeerHandle>>,
    next_transfer_id: AtomicU64,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
}

impl Transport {
    pub fn new(
        node_id: NodeId,
        frame_size: usize,
        router: Router,
        events: mpsc::UnboundedSender<TransportEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            node_id,
            frame_size,
            router,
            peers: Mutex::new(HashMap::new()),
            next_transfer_id: AtomicU64::new(0),
            events,
            shutdown,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Open (or keep) the ordered outbound channel to a remote node.
    pub async fn connect_peer(&self, node: NodeId, addr: &str) {
        let mut peers = self.peers.lock().await;
        if peers.contains_key(&node) {
            return;
        }
        let handle = peer::spawn_writer(
            node.clone(),
            addr.to_string(),
            self.events.clone(),
            self.shutdown.child_token(),
        );
        peers.insert(node, handle);
    }

    /// Forget the outbound channel to a node that left the cluster.
    pub async fn drop_peer(&self, node: &NodeId) {
        self.peers.lock().await.remove(node);
    }

    /// Fire-and-forget send from one logical actor to another.
    ///
    /// Local destinations short-circuit the wire but keep the same
    /// provenance semantics; remote destinations travel as a run of
    /// chunks under a fresh transfer id.
    pub async fn send(
        &self,
        sender: ActorPath,
        receiver: ActorPath,
        envelope: Envelope,
    ) -> Result<()> {
        if receiver.node == self.node_id {
            self.router
                .deliver(&receiver, Delivery { sender, envelope })
                .await;
            return Ok(());
        }

        let transfer_id = self.next_transfer_id.fetch_add(1, Ordering::Relaxed);
        let chunks =
            chunk::split_into_chunks(transfer_id, &sender, &receiver, &envelope, self.frame_size)?;

        let peers = self.peers.lock().await;
        let peer = peers.get(&receiver.node).ok_or_else(|| {
            ClusterError::transport_error(format!("no connection to node {}", receiver.node))
        })?;
        peer.send_chunks(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::COORDINATOR;

    #[tokio::test]
    async fn test_local_send_short_circuits() {
        let router = Router::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(COORDINATOR, tx).await;

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let transport = Transport::new(
            "node-a".to_string(),
            8096,
            router,
            events_tx,
            CancellationToken::new(),
        );

        let sender = ActorPath::new("node-a", "worker-0");
        let receiver = ActorPath::new("node-a", COORDINATOR);
        transport
            .send(sender.clone(), receiver, Envelope::RegisterWorker)
            .await
            .unwrap();

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.sender, sender);
        assert_eq!(delivery.envelope, Envelope::RegisterWorker);
    }

    #[tokio::test]
    async fn test_remote_send_without_connection_is_an_error() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let transport = Transport::new(
            "node-a".to_string(),
            8096,
            Router::default(),
            events_tx,
            CancellationToken::new(),
        );

        let result = transport
            .send(
                ActorPath::new("node-a", "worker-0"),
                ActorPath::new("node-b", COORDINATOR),
                Envelope::RegisterWorker,
            )
            .await;
        assert!(result.is_err());
    }
}
