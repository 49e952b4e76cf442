//! The per-node transport endpoint.
//!
//! Every node runs one TCP listener at a well-known address. Inbound
//! connections carry length-delimited chunk frames; a single reassembly
//! task merges them back into messages and delivers to the logical
//! destination's mailbox, so reassembly state is mutated by exactly one
//! task.

use crate::cluster::messages::Delivery;
use crate::cluster::types::NodeId;
use crate::transport::chunk::{Chunk, Reassembler};
use crate::transport::{Router, TransportEvent};
use futures::StreamExt;
use hashbreak_common::{ClusterError, Result};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bind the node's transport endpoint and spawn its accept and reassembly
/// tasks. Returns the actual bound address (useful with port 0).
pub async fn bind(
    addr: &str,
    router: Router,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
) -> Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        ClusterError::transport_error_with_source(format!("failed to bind endpoint at {addr}"), e)
    })?;
    let local_addr = listener.local_addr().map_err(|e| {
        ClusterError::transport_error_with_source("failed to resolve bound address", e)
    })?;
    info!("transport endpoint listening on {}", local_addr);

    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<Chunk>();

    tokio::spawn(reassembly_loop(chunk_rx, router, shutdown.clone()));
    tokio::spawn(accept_loop(listener, chunk_tx, events, shutdown));

    Ok(local_addr)
}

async fn accept_loop(
    listener: TcpListener,
    chunk_tx: mpsc::UnboundedSender<Chunk>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    debug!("accepted connection from {}", remote);
                    tokio::spawn(connection_loop(
                        stream,
                        chunk_tx.clone(),
                        events.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!("failed to accept connection: {}", e),
            }
        }
    }
}

/// Drain chunk frames from one inbound connection.
///
/// The logical peer node is learned from the first chunk seen, so the
/// connection's end can be reported as loss of that member.
async fn connection_loop(
    stream: TcpStream,
    chunk_tx: mpsc::UnboundedSender<Chunk>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
) {
    let mut framed = FramedRead::new(stream, LengthDelimitedCodec::new());
    let mut peer_node: Option<NodeId> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = framed.next() => {
                let Some(frame) = frame else { break };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("inbound frame error: {}", e);
                        break;
                    }
                };
                let chunk = match bincode::decode_from_slice::<Chunk, _>(
                    &frame,
                    bincode::config::standard(),
                ) {
                    Ok((chunk, _)) => chunk,
                    Err(e) => {
                        warn!("dropping undecodable frame: {}", e);
                        continue;
                    }
                };
                if peer_node.is_none() {
                    peer_node = Some(chunk.sender.node.clone());
                }
                if chunk_tx.send(chunk).is_err() {
                    return;
                }
            }
        }
    }

    if let Some(node) = peer_node {
        debug!("connection from node {} closed", node);
        let _ = events.send(TransportEvent::PeerClosed { node });
    }
}

async fn reassembly_loop(
    mut chunk_rx: mpsc::UnboundedReceiver<Chunk>,
    router: Router,
    shutdown: CancellationToken,
) {
    let mut reassembler = Reassembler::new();
    loop {
        tokio::select! {
            biased;
            maybe = chunk_rx.recv() => {
                let Some(chunk) = maybe else { break };
                match reassembler.offer(chunk) {
                    Ok(Some(assembled)) => {
                        router
                            .deliver(
                                &assembled.receiver,
                                Delivery {
                                    sender: assembled.sender,
                                    envelope: assembled.envelope,
                                },
                            )
                            .await;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("dropping transfer: {}", e),
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
