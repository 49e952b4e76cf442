//! Self-describing message codec.
//!
//! Payloads travel as raw bytes plus a serializer id and a manifest
//! string, which is enough for the receiving endpoint to reconstruct the
//! original message without a shared schema registry.

use crate::cluster::messages::Envelope;
use hashbreak_common::{ClusterError, Result};
use serde::{Deserialize, Serialize};

/// Identifies the wire codec a payload was produced with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub enum SerializerId {
    /// Compact binary encoding, the default for all cluster traffic
    Bincode,
    /// Self-describing JSON, kept for debugging payload dumps
    Json,
}

/// Serialize an envelope, returning the bytes plus the metadata the
/// receiving side needs to reconstruct it.
pub fn encode_envelope(envelope: &Envelope) -> Result<(Vec<u8>, SerializerId, String)> {
    let bytes = bincode::encode_to_vec(envelope, bincode::config::standard()).map_err(|e| {
        ClusterError::serialization_error_with_source(
            format!("failed to encode {} envelope", envelope.manifest()),
            e,
        )
    })?;
    Ok((bytes, SerializerId::Bincode, envelope.manifest().to_string()))
}

/// Reconstruct an envelope from reassembled bytes using the carried
/// serializer id and manifest.
pub fn decode_envelope(bytes: &[u8], serializer: SerializerId, manifest: &str) -> Result<Envelope> {
    let envelope = match serializer {
        SerializerId::Bincode => {
            let (envelope, _) =
                bincode::decode_from_slice::<Envelope, _>(bytes, bincode::config::standard())
                    .map_err(|e| {
                        ClusterError::deserialization_error_with_source(
                            format!("failed to decode {manifest} envelope"),
                            e,
                        )
                    })?;
            envelope
        }
        SerializerId::Json => serde_json::from_slice(bytes).map_err(|e| {
            ClusterError::deserialization_error_with_source(
                format!("failed to decode {manifest} envelope"),
                e,
            )
        })?,
    };

    if envelope.manifest() != manifest {
        return Err(ClusterError::deserialization_error(format!(
            "manifest mismatch: frame said {manifest}, payload decoded as {}",
            envelope.manifest()
        )));
    }
    Ok(envelope)
}
