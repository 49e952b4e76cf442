//! Ordered outbound channels to remote nodes.
//!
//! All traffic for one destination node funnels through a single writer
//! task over one TCP connection, which is what makes the transport's
//! in-order per-pair delivery precondition hold.

use crate::cluster::types::NodeId;
use crate::transport::chunk::Chunk;
use crate::transport::TransportEvent;
use futures::SinkExt;
use hashbreak_common::{ClusterError, Result};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Handle for enqueueing chunks towards one remote node.
#[derive(Clone)]
pub struct PeerHandle {
    node: NodeId,
    tx: mpsc::UnboundedSender<Chunk>,
}

impl PeerHandle {
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Enqueue a run of chunks. The writer task preserves enqueue order.
    pub fn send_chunks(&self, chunks: Vec<Chunk>) -> Result<()> {
        for chunk in chunks {
            self.tx.send(chunk).map_err(|_| {
                ClusterError::transport_error(format!(
                    "connection to node {} is closed",
                    self.node
                ))
            })?;
        }
        Ok(())
    }
}

/// Spawn the writer task for a remote node and hand back its queue.
///
/// Connection failures are reported on the transport event channel so the
/// membership layer can translate them into member removal.
pub fn spawn_writer(
    node: NodeId,
    addr: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
) -> PeerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Chunk>();
    let handle = PeerHandle {
        node: node.clone(),
        tx,
    };

    tokio::spawn(async move {
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("failed to connect to node {} at {}: {}", node, addr, e);
                let _ = events.send(TransportEvent::PeerClosed { node });
                return;
            }
        };
        debug!("connected to node {} at {}", node, addr);
        let mut framed = FramedWrite::new(stream, LengthDelimitedCodec::new());

        loop {
            tokio::select! {
                biased;
                maybe = rx.recv() => {
                    let Some(chunk) = maybe else { break };
                    if !write_chunk(&mut framed, &node, chunk, &events).await {
                        return;
                    }
                }
                _ = shutdown.cancelled() => {
                    // Flush whatever was enqueued before the shutdown so
                    // final control messages still reach the peer.
                    while let Ok(chunk) = rx.try_recv() {
                        if !write_chunk(&mut framed, &node, chunk, &events).await {
                            return;
                        }
                    }
                    break;
                }
            }
        }
        debug!("writer for node {} stopped", node);
    });

    handle
}

async fn write_chunk(
    framed: &mut FramedWrite<TcpStream, LengthDelimitedCodec>,
    node: &NodeId,
    chunk: Chunk,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> bool {
    let bytes = match bincode::encode_to_vec(&chunk, bincode::config::standard()) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to encode chunk for node {}: {}", node, e);
            return true;
        }
    };
    if let Err(e) = framed.send(Bytes::from(bytes)).await {
        warn!("write to node {} failed: {}", node, e);
        let _ = events.send(TransportEvent::PeerClosed { node: node.clone() });
        return false;
    }
    true
}
