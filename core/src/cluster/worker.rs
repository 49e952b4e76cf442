//! The worker compute engine.
//!
//! Workers are stateless between tasks except for accumulated knowledge:
//! the shared alphabet, the deduplicated hint-hash set and a lagging copy
//! of the cracked-hints table, all merged from coordinator pushes. Both
//! task kinds run to completion inside the mailbox loop and reply with an
//! explicit failure tag instead of dying on malformed input.

use crate::cluster::membership::MembershipEvent;
use crate::cluster::messages::{CrackResult, Delivery, Envelope, PasswordOutcome};
use crate::cluster::types::{ActorPath, COORDINATOR, NodeRole, Record};
use crate::crack;
use crate::transport::Transport;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One worker actor, driven by its mailbox and the membership stream.
pub struct Worker {
    path: ActorPath,
    transport: Arc<Transport>,
    mailbox: mpsc::UnboundedReceiver<Delivery>,
    membership: mpsc::UnboundedReceiver<MembershipEvent>,
    shutdown: CancellationToken,
    feasible_bound: usize,

    coordinator: Option<ActorPath>,
    password_chars: Vec<char>,
    hint_hashes: HashSet<String>,
    cracked_hints: HashMap<String, String>,
}

impl Worker {
    pub fn new(
        path: ActorPath,
        transport: Arc<Transport>,
        mailbox: mpsc::UnboundedReceiver<Delivery>,
        membership: mpsc::UnboundedReceiver<MembershipEvent>,
        shutdown: CancellationToken,
        feasible_bound: usize,
    ) -> Self {
        Self {
            path,
            transport,
            mailbox,
            membership,
            shutdown,
            feasible_bound,
            coordinator: None,
            password_chars: Vec::new(),
            hint_hashes: HashSet::new(),
            cracked_hints: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                maybe = self.mailbox.recv() => {
                    let Some(delivery) = maybe else { break };
                    if self.handle(delivery).await {
                        break;
                    }
                }
                maybe = self.membership.recv() => {
                    let Some(event) = maybe else { break };
                    if self.handle_membership(event).await {
                        break;
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
        debug!("worker {} stopped", self.path);
    }

    /// Returns true once the worker should stop.
    async fn handle(&mut self, delivery: Delivery) -> bool {
        match delivery.envelope {
            Envelope::PasswordAlphabet { chars } => {
                self.password_chars = chars;
            }
            Envelope::HintHashes { hashes } => {
                self.hint_hashes.extend(hashes);
            }
            Envelope::CrackedHints { entries } => {
                self.cracked_hints.extend(entries);
            }
            Envelope::HintTask { character } => {
                let reply = self.run_hint_task(character);
                self.reply(reply).await;
            }
            Envelope::CrackTask { record } => {
                let reply = self.run_crack_task(&record);
                self.reply(reply).await;
            }
            Envelope::Shutdown => {
                // The whole node is done once its workers are dismissed;
                // cancelling an already-cancelled token is a no-op.
                self.shutdown.cancel();
                return true;
            }
            other => warn!(
                "worker {} received unknown message from {}: {}",
                self.path,
                delivery.sender,
                other.manifest()
            ),
        }
        false
    }

    async fn handle_membership(&mut self, event: MembershipEvent) -> bool {
        match event {
            MembershipEvent::MemberUp { info } => {
                // Register once, with the first node seen carrying the
                // coordinator role.
                if info.role == NodeRole::Master && self.coordinator.is_none() {
                    let coordinator = ActorPath::new(info.node_id, COORDINATOR);
                    info!("worker {} registering with {}", self.path, coordinator);
                    self.coordinator = Some(coordinator);
                    self.reply(Envelope::RegisterWorker).await;
                }
                false
            }
            MembershipEvent::MemberRemoved { node_id } => {
                match &self.coordinator {
                    Some(coordinator) if coordinator.node == node_id => {
                        // A single-coordinator cluster has nothing left to
                        // offer this worker.
                        error!(
                            "worker {} lost the coordinator, shutting down",
                            self.path
                        );
                        self.shutdown.cancel();
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    fn run_hint_task(&self, character: char) -> Envelope {
        if self.password_chars.is_empty() {
            return Envelope::HintResults {
                character,
                cracked: HashMap::new(),
                error: Some("hint task received before the alphabet".to_string()),
            };
        }
        if !self.password_chars.contains(&character) {
            return Envelope::HintResults {
                character,
                cracked: HashMap::new(),
                error: Some(format!("character {character:?} is not in the alphabet")),
            };
        }

        debug!("worker {} hashing without {:?}", self.path, character);
        let cracked = crack::crack_hints(&self.password_chars, character, &self.hint_hashes);
        debug!(
            "worker {} matched {} hints for {:?}",
            self.path,
            cracked.len(),
            character
        );
        Envelope::HintResults {
            character,
            cracked,
            error: None,
        }
    }

    fn run_crack_task(&self, record: &Record) -> Envelope {
        debug!("worker {} cracking record {}", self.path, record.name);
        let result = if record.alphabet.is_empty() {
            CrackResult {
                record_id: record.id,
                name: record.name.clone(),
                outcome: PasswordOutcome::Failed {
                    reason: "record has an empty alphabet".to_string(),
                },
            }
        } else {
            crack::crack_password(record, &self.cracked_hints, self.feasible_bound)
        };
        Envelope::CrackResult { result }
    }

    async fn reply(&self, envelope: Envelope) {
        let Some(coordinator) = self.coordinator.clone() else {
            warn!(
                "worker {} has no coordinator to receive {}",
                self.path,
                envelope.manifest()
            );
            return;
        };
        if let Err(e) = self
            .transport
            .send(self.path.clone(), coordinator, envelope)
            .await
        {
            warn!("worker {} reply failed: {}", self.path, e);
        }
    }
}
