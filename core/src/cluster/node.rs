//! Node assembly.
//!
//! A [`ClusterNode`] wires one transport endpoint, the membership tracker
//! and the role-appropriate actors together, then runs until the node's
//! cancellation token fires. Master nodes host the coordinator, reader and
//! collector plus optional local workers; worker nodes host worker actors
//! that discover the coordinator through the configured seed.

use crate::cluster::coordinator::Coordinator;
use crate::cluster::membership::MembershipService;
use crate::cluster::messages::Envelope;
use crate::cluster::types::{
    ActorPath, COLLECTOR, COORDINATOR, MEMBERSHIP, NodeId, NodeInfo, NodeRole, READER,
};
use crate::cluster::worker::Worker;
use crate::config::ClusterConfig;
use crate::io::{Collector, LineFileSource, Reader};
use crate::transport::{self, Router, Transport};
use hashbreak_common::{ClusterError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One process-level member of the cluster.
pub struct ClusterNode {
    node_id: NodeId,
    role: NodeRole,
    bind_addr: String,
    /// Seed endpoint worker nodes probe: (node id, address)
    seed: Option<(NodeId, String)>,
    input_path: Option<PathBuf>,
    local_workers: usize,
    config: ClusterConfig,
    shutdown: CancellationToken,
    observer: Option<mpsc::UnboundedSender<String>>,
}

impl ClusterNode {
    /// A master node: coordinator, reader over `input_path`, collector,
    /// and `workers_per_node` co-resident workers.
    pub fn master(
        node_id: impl Into<NodeId>,
        bind_addr: impl Into<String>,
        input_path: impl Into<PathBuf>,
        config: ClusterConfig,
    ) -> Self {
        let local_workers = config.workers_per_node;
        Self {
            node_id: node_id.into(),
            role: NodeRole::Master,
            bind_addr: bind_addr.into(),
            seed: None,
            input_path: Some(input_path.into()),
            local_workers,
            config,
            shutdown: CancellationToken::new(),
            observer: None,
        }
    }

    /// A worker node probing the given seed endpoint for the coordinator.
    pub fn worker(
        node_id: impl Into<NodeId>,
        bind_addr: impl Into<String>,
        seed_id: impl Into<NodeId>,
        seed_addr: impl Into<String>,
        config: ClusterConfig,
    ) -> Self {
        let local_workers = config.workers_per_node;
        Self {
            node_id: node_id.into(),
            role: NodeRole::Worker,
            bind_addr: bind_addr.into(),
            seed: Some((seed_id.into(), seed_addr.into())),
            input_path: None,
            local_workers,
            config,
            shutdown: CancellationToken::new(),
            observer: None,
        }
    }

    /// Override how many worker actors this node hosts (a master with zero
    /// local workers relies entirely on remote nodes).
    pub fn with_local_workers(mut self, count: usize) -> Self {
        self.local_workers = count;
        self
    }

    /// Mirror every collected result line to the given channel.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<String>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Token that stops the whole node when cancelled; the coordinator
    /// cancels it itself once the run terminates.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bring the node up and block until it shuts down.
    pub async fn run(self) -> Result<()> {
        let router = Router::default();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Transport::new(
            self.node_id.clone(),
            self.config.frame_size,
            router.clone(),
            events_tx.clone(),
            self.shutdown.clone(),
        ));

        let bound_addr = transport::endpoint::bind(
            &self.bind_addr,
            router.clone(),
            events_tx,
            self.shutdown.clone(),
        )
        .await?;

        let self_info = NodeInfo {
            node_id: self.node_id.clone(),
            addr: bound_addr.to_string(),
            role: self.role,
        };
        info!("node {} starting as {:?}", self.node_id, self.role);

        let (membership_tx, membership_rx) = mpsc::unbounded_channel();
        router.register(MEMBERSHIP, membership_tx).await;
        let mut membership = MembershipService::new(
            self_info,
            Arc::clone(&transport),
            membership_rx,
            events_rx,
            self.seed.clone(),
            self.shutdown.clone(),
        );

        for i in 0..self.local_workers {
            let name = format!("worker-{i}");
            let (tx, rx) = mpsc::unbounded_channel();
            router.register(name.clone(), tx).await;
            let worker = Worker::new(
                ActorPath::new(self.node_id.clone(), name),
                Arc::clone(&transport),
                rx,
                membership.subscribe(),
                self.shutdown.clone(),
                self.config.feasible_alphabet_bound,
            );
            tokio::spawn(worker.run());
        }

        if self.role == NodeRole::Master {
            let input_path = self.input_path.clone().ok_or_else(|| {
                ClusterError::configuration_error("master node needs an input file")
            })?;
            let source = LineFileSource::open(&input_path).await?;

            let (reader_tx, reader_rx) = mpsc::unbounded_channel();
            router.register(READER, reader_tx).await;
            let reader = Reader::new(
                ActorPath::new(self.node_id.clone(), READER),
                Arc::clone(&transport),
                reader_rx,
                Box::new(source),
                self.config.read_batch_size,
                self.shutdown.clone(),
            );
            tokio::spawn(reader.run());

            let (collector_tx, collector_rx) = mpsc::unbounded_channel();
            router.register(COLLECTOR, collector_tx).await;
            let collector = Collector::new(
                ActorPath::new(self.node_id.clone(), COLLECTOR),
                collector_rx,
                self.shutdown.clone(),
                self.observer.clone(),
            );
            tokio::spawn(collector.run());

            let (coordinator_tx, coordinator_rx) = mpsc::unbounded_channel();
            router.register(COORDINATOR, coordinator_tx).await;
            let coordinator = Coordinator::new(
                ActorPath::new(self.node_id.clone(), COORDINATOR),
                ActorPath::new(self.node_id.clone(), READER),
                ActorPath::new(self.node_id.clone(), COLLECTOR),
                Arc::clone(&transport),
                self.config.clone(),
                coordinator_rx,
                membership.subscribe(),
                self.shutdown.clone(),
            );
            tokio::spawn(coordinator.run());
        }

        tokio::spawn(membership.run());

        if self.role == NodeRole::Master {
            // The run starts itself once the node is assembled.
            transport
                .send(
                    ActorPath::new(self.node_id.clone(), "system"),
                    ActorPath::new(self.node_id.clone(), COORDINATOR),
                    Envelope::Start,
                )
                .await?;
        }

        self.shutdown.cancelled().await;
        // Give outbound writers a moment to flush final control messages.
        tokio::time::sleep(Duration::from_millis(200)).await;
        info!("node {} stopped", self.node_id);
        Ok(())
    }
}
