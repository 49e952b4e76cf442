//! Cluster membership tracking and coordinator discovery.
//!
//! Discovery is an explicit handshake: a starting worker node sends a
//! `Probe` to the configured seed endpoint; the node that self-identifies
//! as coordinator answers with `Welcome` and records the prober as a
//! member. Member loss is derived from connection loss reported by the
//! transport. Local components subscribe to the resulting
//! [`MembershipEvent`] stream; the design assumes a single coordinator
//! whose departure is fatal for workers, so there is no re-election.

use crate::cluster::messages::{Delivery, Envelope};
use crate::cluster::types::{ActorPath, MEMBERSHIP, NodeId, NodeInfo, NodeRole};
use crate::transport::{Transport, TransportEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Membership change notifications delivered to local subscribers.
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    MemberUp { info: NodeInfo },
    MemberRemoved { node_id: NodeId },
}

/// Per-node membership tracker.
pub struct MembershipService {
    self_info: NodeInfo,
    transport: Arc<Transport>,
    mailbox: mpsc::UnboundedReceiver<Delivery>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    subscribers: Vec<mpsc::UnboundedSender<MembershipEvent>>,
    members: HashMap<NodeId, NodeInfo>,
    /// Seed endpoint a worker node probes on start: (node id, address)
    seed: Option<(NodeId, String)>,
    shutdown: CancellationToken,
}

impl MembershipService {
    pub fn new(
        self_info: NodeInfo,
        transport: Arc<Transport>,
        mailbox: mpsc::UnboundedReceiver<Delivery>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        seed: Option<(NodeId, String)>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            self_info,
            transport,
            mailbox,
            events,
            subscribers: Vec::new(),
            members: HashMap::new(),
            seed,
            shutdown,
        }
    }

    /// Subscribe before `run`; every membership change is fanned out to
    /// all subscribers.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MembershipEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn self_path(&self) -> ActorPath {
        ActorPath::new(self.self_info.node_id.clone(), MEMBERSHIP)
    }

    pub async fn run(mut self) {
        // The coordinator's node counts itself as a member, so co-resident
        // workers discover the coordinator without a probe.
        if self.self_info.role == NodeRole::Master {
            let info = self.self_info.clone();
            self.members.insert(info.node_id.clone(), info.clone());
            self.emit(MembershipEvent::MemberUp { info });
        }

        // Worker nodes probe the seed once on start.
        if let Some((seed_id, seed_addr)) = self.seed.clone() {
            self.transport.connect_peer(seed_id.clone(), &seed_addr).await;
            let probe = Envelope::Probe {
                info: self.self_info.clone(),
            };
            if let Err(e) = self
                .transport
                .send(self.self_path(), ActorPath::new(seed_id, MEMBERSHIP), probe)
                .await
            {
                warn!("failed to probe seed node: {}", e);
            }
        }

        loop {
            tokio::select! {
                biased;
                maybe = self.mailbox.recv() => {
                    let Some(delivery) = maybe else { break };
                    if self.handle(delivery).await {
                        break;
                    }
                }
                maybe = self.events.recv() => {
                    let Some(event) = maybe else { break };
                    self.handle_transport_event(event).await;
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
        debug!("membership service on {} stopped", self.self_info.node_id);
    }

    /// Returns true once the service should stop.
    async fn handle(&mut self, delivery: Delivery) -> bool {
        match delivery.envelope {
            Envelope::Probe { info } => {
                if self.self_info.role != NodeRole::Master {
                    warn!("ignoring discovery probe from {}: not a coordinator node", info.node_id);
                    return false;
                }
                info!("node {} joined the cluster from {}", info.node_id, info.addr);
                self.transport
                    .connect_peer(info.node_id.clone(), &info.addr)
                    .await;
                let welcome = Envelope::Welcome {
                    coordinator: self.self_info.clone(),
                };
                let reply_to = ActorPath::new(info.node_id.clone(), MEMBERSHIP);
                if let Err(e) = self.transport.send(self.self_path(), reply_to, welcome).await {
                    warn!("failed to welcome node {}: {}", info.node_id, e);
                }
                self.members.insert(info.node_id.clone(), info.clone());
                self.emit(MembershipEvent::MemberUp { info });
            }
            Envelope::Welcome { coordinator } => {
                info!(
                    "discovered coordinator node {} at {}",
                    coordinator.node_id, coordinator.addr
                );
                self.members
                    .insert(coordinator.node_id.clone(), coordinator.clone());
                self.emit(MembershipEvent::MemberUp { info: coordinator });
            }
            Envelope::Shutdown => return true,
            other => warn!(
                "membership service received unknown message: {}",
                other.manifest()
            ),
        }
        false
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerClosed { node } => {
                self.transport.drop_peer(&node).await;
                if self.members.remove(&node).is_some() {
                    info!("node {} left the cluster", node);
                    self.emit(MembershipEvent::MemberRemoved { node_id: node });
                }
            }
        }
    }

    fn emit(&mut self, event: MembershipEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
