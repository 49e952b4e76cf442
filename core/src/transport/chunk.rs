//! Chunking and reassembly of oversized payloads.
//!
//! A serialized message is split into frames of at most `frame_size`
//! payload bytes, each tagged with its sequence index and the total frame
//! count. The receiving endpoint accumulates payloads per transfer and
//! reconstructs the message on the final frame.
//!
//! Frames are assumed to arrive in per-sender order; the transport layer
//! guarantees this by writing each run of chunks over a single ordered
//! connection. Continuity violations are surfaced as errors, and a lost
//! frame stalls its transfer indefinitely (no acknowledgement, no
//! retransmission).

use crate::cluster::messages::Envelope;
use crate::cluster::types::ActorPath;
use crate::transport::codec::{self, SerializerId};
use hashbreak_common::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One bounded-size piece of a fragmented payload.
///
/// Sender and receiver are logical identities carried as payload fields,
/// not transport addresses, so the receiving endpoint can deliver with
/// correct provenance. The transfer id keys reassembly, letting several
/// oversized transfers between the same pair be in flight at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Chunk {
    pub transfer_id: u64,
    pub sender: ActorPath,
    pub receiver: ActorPath,
    pub serializer: SerializerId,
    pub manifest: String,
    pub index: u32,
    pub total: u32,
    pub payload: Vec<u8>,
}

/// Split an envelope into a run of chunks no larger than `frame_size`.
///
/// Every message yields at least one chunk, so `0 <= index < total` holds
/// even for empty payloads.
pub fn split_into_chunks(
    transfer_id: u64,
    sender: &ActorPath,
    receiver: &ActorPath,
    envelope: &Envelope,
    frame_size: usize,
) -> Result<Vec<Chunk>> {
    if frame_size == 0 {
        return Err(ClusterError::configuration_error(
            "transport frame size must be at least 1 byte",
        ));
    }

    let (bytes, serializer, manifest) = codec::encode_envelope(envelope)?;
    let total = bytes.len().div_ceil(frame_size).max(1) as u32;

    let mut chunks = Vec::with_capacity(total as usize);
    for index in 0..total {
        let start = index as usize * frame_size;
        let end = (start + frame_size).min(bytes.len());
        chunks.push(Chunk {
            transfer_id,
            sender: sender.clone(),
            receiver: receiver.clone(),
            serializer,
            manifest: manifest.clone(),
            index,
            total,
            payload: bytes[start..end].to_vec(),
        });
    }
    Ok(chunks)
}

/// A fully reassembled message with its logical provenance.
#[derive(Debug)]
pub struct Assembled {
    pub sender: ActorPath,
    pub receiver: ActorPath,
    pub envelope: Envelope,
}

struct PendingTransfer {
    receiver: ActorPath,
    serializer: SerializerId,
    manifest: String,
    total: u32,
    received: u32,
    buffer: Vec<u8>,
}

/// Accumulates chunk payloads per (sender, transfer) until the final frame
/// arrives, then decodes and evicts the entry.
#[derive(Default)]
pub struct Reassembler {
    pending: HashMap<(ActorPath, u64), PendingTransfer>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the reconstructed message once its final
    /// frame has been consumed, `None` while the transfer is still open.
    ///
    /// A malformed or out-of-sequence chunk fails the whole transfer: the
    /// entry is evicted and an error returned for the caller to log.
    pub fn offer(&mut self, chunk: Chunk) -> Result<Option<Assembled>> {
        if chunk.total == 0 || chunk.index >= chunk.total {
            return Err(ClusterError::protocol_error(format!(
                "chunk index {} out of range for total {} (transfer {} from {})",
                chunk.index, chunk.total, chunk.transfer_id, chunk.sender
            )));
        }

        let key = (chunk.sender.clone(), chunk.transfer_id);
        let entry = self.pending.entry(key.clone()).or_insert_with(|| {
            PendingTransfer {
                receiver: chunk.receiver.clone(),
                serializer: chunk.serializer,
                manifest: chunk.manifest.clone(),
                total: chunk.total,
                received: 0,
                buffer: Vec::new(),
            }
        });

        if chunk.index != entry.received
            || chunk.total != entry.total
            || chunk.manifest != entry.manifest
        {
            let expected = entry.received;
            self.pending.remove(&key);
            return Err(ClusterError::protocol_error(format!(
                "transfer {} from {} broke sequence: expected frame {}, got {} of {}",
                chunk.transfer_id, chunk.sender, expected, chunk.index, chunk.total
            )));
        }

        entry.buffer.extend_from_slice(&chunk.payload);
        entry.received += 1;

        if entry.received == entry.total {
            let entry = self.pending.remove(&key).expect("entry present");
            let envelope =
                codec::decode_envelope(&entry.buffer, entry.serializer, &entry.manifest)?;
            return Ok(Some(Assembled {
                sender: key.0,
                receiver: entry.receiver,
                envelope,
            }));
        }
        Ok(None)
    }

    /// Number of transfers currently awaiting more frames.
    pub fn open_transfers(&self) -> usize {
        self.pending.len()
    }
}
