//! Cluster message protocol.
//!
//! Every message that crosses an actor mailbox or the wire is one variant
//! of the closed [`Envelope`] union. Components match the subset they
//! understand and log the rest; nothing dispatches on runtime type names.

use crate::cluster::types::{ActorPath, NodeInfo, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// All messages exchanged between cluster components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum Envelope {
    // -- membership handshake --
    /// Discovery probe a starting node sends to the configured seed
    Probe { info: NodeInfo },
    /// Reply from the node that self-identifies as coordinator
    Welcome { coordinator: NodeInfo },

    // -- worker to coordinator --
    /// One-shot registration after the coordinator has been discovered
    RegisterWorker,
    /// Reply to a hint-elimination task: every hash->plaintext pair found
    /// for the omitted character. `error` tags a failed attempt; the
    /// coordinator frees the worker either way.
    HintResults {
        character: char,
        cracked: HashMap<String, String>,
        error: Option<String>,
    },
    /// Reply to a password-search task
    CrackResult { result: CrackResult },

    // -- coordinator to worker --
    /// Full shared alphabet, derived once from the first record
    PasswordAlphabet { chars: Vec<char> },
    /// A batch of hint hashes; workers merge into their deduplicated set
    HintHashes { hashes: Vec<String> },
    /// A batch of cracked-hint entries; workers merge into their lagging copy
    CrackedHints { entries: HashMap<String, String> },
    /// Hint-elimination task: permute the alphabet without this character
    HintTask { character: char },
    /// Password-search task over one record
    CrackTask { record: Record },

    // -- reader protocol --
    /// Coordinator requests the next input batch
    ReadBatch,
    /// Reader reply; an empty batch signals end of input
    RecordBatch { records: Vec<Record> },

    // -- collector protocol --
    /// Note one result line, fire-and-forget
    Collect { line: String },
    /// Dump everything collected so far
    Print,

    // -- control --
    /// Kick off a cracking run on the coordinator
    Start,
    /// Graceful, idempotent stop directive for any component
    Shutdown,
}

impl Envelope {
    /// Type manifest carried with serialized payloads so the receiving side
    /// can reconstruct without a shared schema registry.
    pub fn manifest(&self) -> &'static str {
        match self {
            Envelope::Probe { .. } => "Probe",
            Envelope::Welcome { .. } => "Welcome",
            Envelope::RegisterWorker => "RegisterWorker",
            Envelope::HintResults { .. } => "HintResults",
            Envelope::CrackResult { .. } => "CrackResult",
            Envelope::PasswordAlphabet { .. } => "PasswordAlphabet",
            Envelope::HintHashes { .. } => "HintHashes",
            Envelope::CrackedHints { .. } => "CrackedHints",
            Envelope::HintTask { .. } => "HintTask",
            Envelope::CrackTask { .. } => "CrackTask",
            Envelope::ReadBatch => "ReadBatch",
            Envelope::RecordBatch { .. } => "RecordBatch",
            Envelope::Collect { .. } => "Collect",
            Envelope::Print => "Print",
            Envelope::Start => "Start",
            Envelope::Shutdown => "Shutdown",
        }
    }
}

/// Outcome of a password-search task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum PasswordOutcome {
    /// The candidate whose digest matched the record's password hash
    Found { password: String },
    /// Exhaustive search over the reduced alphabet found no match
    NotFound,
    /// The reduced alphabet exceeded the configured feasibility bound;
    /// the search was never attempted
    Infeasible { alphabet_size: usize },
    /// The task itself failed (malformed input, contract violation)
    Failed { reason: String },
}

/// Result of a password-search task for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct CrackResult {
    pub record_id: u32,
    pub name: String,
    pub outcome: PasswordOutcome,
}

impl CrackResult {
    /// The one line per resolved record handed to the collector.
    pub fn display_line(&self) -> String {
        match &self.outcome {
            PasswordOutcome::Found { password } => {
                format!("Cracked {}: {}", self.name, password)
            }
            PasswordOutcome::NotFound => format!("{}: not found", self.name),
            PasswordOutcome::Infeasible { alphabet_size } => format!(
                "{}: infeasible (reduced alphabet of size {})",
                self.name, alphabet_size
            ),
            PasswordOutcome::Failed { reason } => {
                format!("{}: failed ({})", self.name, reason)
            }
        }
    }
}

/// A message as it lands in an actor mailbox, tagged with the logical
/// sender the transport reconstructed.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub sender: ActorPath,
    pub envelope: Envelope,
}
