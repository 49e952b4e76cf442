//! The coordinator (master) scheduling engine.
//!
//! A single owner task holds all global task state: the record queue, the
//! free/busy worker sets, and the authoritative cracked-hints table. Every
//! mutation funnels through its serialized mailbox loop; workers only ever
//! see immutable snapshots inside task payloads.
//!
//! The run is two-phase. First every alphabet character is dispatched once
//! as a hint-elimination task; password-search tasks are issued only after
//! loading has finished and every distinct hint hash is resolved (cracked,
//! or exhausted once all character tasks are accounted for). Work lost to
//! a departed worker is dropped, not re-issued, unless redelivery is
//! enabled in the configuration.

use crate::cluster::membership::MembershipEvent;
use crate::cluster::messages::{CrackResult, Delivery, Envelope};
use crate::cluster::types::{ActorPath, NodeRole, Record};
use crate::config::ClusterConfig;
use crate::transport::Transport;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Work a busy worker is currently holding.
#[derive(Debug, Clone)]
enum InFlight {
    Hint(char),
    Crack(Record),
}

/// The master scheduling engine, driven by its mailbox.
pub struct Coordinator {
    path: ActorPath,
    reader: ActorPath,
    collector: ActorPath,
    transport: Arc<Transport>,
    config: ClusterConfig,
    mailbox: mpsc::UnboundedReceiver<Delivery>,
    membership: mpsc::UnboundedReceiver<MembershipEvent>,
    shutdown: CancellationToken,

    workers: Vec<ActorPath>,
    free_workers: Vec<ActorPath>,
    in_flight: HashMap<ActorPath, InFlight>,

    password_chars: Vec<char>,
    hint_hashes: Vec<String>,
    hint_hash_set: HashSet<String>,
    cracked_hints: HashMap<String, String>,
    to_crack: VecDeque<Record>,
    /// Characters to re-issue after a worker loss (redelivery extension)
    retry_chars: Vec<char>,
    /// Dispatch cursor into `password_chars`
    next_char_index: usize,
    /// Character tasks replied to or written off after a loss
    chars_accounted: usize,
    loading_complete: bool,
    running: bool,
    start_time: Option<Instant>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: ActorPath,
        reader: ActorPath,
        collector: ActorPath,
        transport: Arc<Transport>,
        config: ClusterConfig,
        mailbox: mpsc::UnboundedReceiver<Delivery>,
        membership: mpsc::UnboundedReceiver<MembershipEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            path,
            reader,
            collector,
            transport,
            config,
            mailbox,
            membership,
            shutdown,
            workers: Vec::new(),
            free_workers: Vec::new(),
            in_flight: HashMap::new(),
            password_chars: Vec::new(),
            hint_hashes: Vec::new(),
            hint_hash_set: HashSet::new(),
            cracked_hints: HashMap::new(),
            to_crack: VecDeque::new(),
            retry_chars: Vec::new(),
            next_char_index: 0,
            chars_accounted: 0,
            loading_complete: false,
            running: false,
            start_time: None,
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
        debug!("coordinator stopped");
    }

    /// Returns true once the coordinator should stop.
    async fn handle(&mut self, delivery: Delivery) -> bool {
        let sender = delivery.sender;
        match delivery.envelope {
            Envelope::Start => self.on_start().await,
            Envelope::RecordBatch { records } => return self.on_batch(records).await,
            Envelope::RegisterWorker => self.on_register(sender).await,
            Envelope::HintResults {
                character,
                cracked,
                error,
            } => return self.on_hint_results(sender, character, cracked, error).await,
            Envelope::CrackResult { result } => return self.on_crack_result(sender, result).await,
            Envelope::Shutdown => return true,
            other => warn!(
                "coordinator received unknown message from {}: {}",
                sender,
                other.manifest()
            ),
        }
        false
    }

    async fn handle_membership(&mut self, event: MembershipEvent) -> bool {
        match event {
            // Registration is worker-initiated; node arrival alone changes nothing.
            MembershipEvent::MemberUp { info } => {
                if info.role == NodeRole::Worker {
                    debug!("worker node {} is up", info.node_id);
                }
                false
            }
            MembershipEvent::MemberRemoved { node_id } => self.on_node_removed(&node_id).await,
        }
    }

    async fn on_start(&mut self) {
        if self.running {
            warn!("ignoring duplicate start request");
            return;
        }
        self.running = true;
        self.start_time = Some(Instant::now());
        self.password_chars.clear();
        self.hint_hashes.clear();
        self.hint_hash_set.clear();
        self.cracked_hints.clear();
        self.to_crack.clear();
        self.retry_chars.clear();
        self.next_char_index = 0;
        self.chars_accounted = 0;
        self.loading_complete = false;

        info!("starting cracking run, requesting first batch");
        self.send(self.reader.clone(), Envelope::ReadBatch).await;
    }

    /// Input arrives in batches so early batches can be held without the
    /// whole file in memory; an empty batch ends the loading phase.
    async fn on_batch(&mut self, records: Vec<Record>) -> bool {
        if records.is_empty() {
            info!(
                "input complete: {} records, {} distinct hint hashes",
                self.to_crack.len(),
                self.hint_hash_set.len()
            );
            self.loading_complete = true;
            self.dispatch().await;
            return self.maybe_terminate().await;
        }

        let batch_size = records.len();
        for record in records {
            if self.password_chars.is_empty() {
                // The alphabet is shared by all records of a run.
                self.password_chars = record.alphabet.clone();
            }
            for hash in &record.hint_hashes {
                if self.hint_hash_set.insert(hash.clone()) {
                    self.hint_hashes.push(hash.clone());
                }
            }
            self.to_crack.push_back(record);
        }

        self.send(
            self.collector.clone(),
            Envelope::Collect {
                line: format!("Processed batch of size {batch_size}"),
            },
        )
        .await;
        self.send(self.reader.clone(), Envelope::ReadBatch).await;
        false
    }

    async fn on_register(&mut self, worker: ActorPath) {
        if self.workers.contains(&worker) {
            warn!("worker {} registered twice", worker);
            return;
        }
        info!("registered worker {}", worker);
        self.workers.push(worker.clone());
        self.free_workers.push(worker);
        self.dispatch().await;
    }

    async fn on_hint_results(
        &mut self,
        worker: ActorPath,
        character: char,
        cracked: HashMap<String, String>,
        error: Option<String>,
    ) -> bool {
        if let Some(reason) = error {
            warn!(
                "hint task for character {:?} failed on {}: {}",
                character, worker, reason
            );
        } else {
            debug!(
                "worker {} resolved {} hints for character {:?}",
                worker,
                cracked.len(),
                character
            );
        }
        self.chars_accounted += 1;
        self.cracked_hints.extend(cracked);
        self.release(worker);
        self.dispatch().await;
        self.maybe_terminate().await
    }

    async fn on_crack_result(&mut self, worker: ActorPath, result: CrackResult) -> bool {
        info!("{}", result.display_line());
        self.send(
            self.collector.clone(),
            Envelope::Collect {
                line: result.display_line(),
            },
        )
        .await;
        self.release(worker);
        self.dispatch().await;
        self.maybe_terminate().await
    }

    /// A worker node left: every worker actor it hosted is removed from
    /// both sets. Whatever those workers held is written off; with
    /// redelivery enabled it goes back on the queue instead.
    async fn on_node_removed(&mut self, node_id: &str) -> bool {
        let lost: Vec<ActorPath> = self
            .workers
            .iter()
            .filter(|w| w.node == node_id)
            .cloned()
            .collect();
        if lost.is_empty() {
            return false;
        }

        for worker in &lost {
            self.workers.retain(|w| w != worker);
            self.free_workers.retain(|w| w != worker);
            match self.in_flight.remove(worker) {
                Some(InFlight::Hint(character)) => {
                    if self.config.redeliver_on_loss {
                        warn!(
                            "worker {} lost with hint task {:?}; re-queueing",
                            worker, character
                        );
                        self.retry_chars.push(character);
                    } else {
                        warn!(
                            "worker {} lost with hint task {:?}; its results are gone",
                            worker, character
                        );
                        self.chars_accounted += 1;
                    }
                }
                Some(InFlight::Crack(record)) => {
                    if self.config.redeliver_on_loss {
                        warn!(
                            "worker {} lost while cracking {}; re-queueing",
                            worker, record.name
                        );
                        self.to_crack.push_front(record);
                    } else {
                        warn!(
                            "worker {} lost while cracking {}; the record is dropped",
                            worker, record.name
                        );
                    }
                }
                None => debug!("idle worker {} removed", worker),
            }
        }
        info!(
            "removed {} workers of node {}; {} remain",
            lost.len(),
            node_id,
            self.workers.len()
        );

        self.dispatch().await;
        self.maybe_terminate().await
    }

    fn release(&mut self, worker: ActorPath) {
        self.in_flight.remove(&worker);
        // A result can arrive after its worker was deregistered; only
        // registered workers return to the free set.
        if self.workers.contains(&worker) && !self.free_workers.contains(&worker) {
            self.free_workers.push(worker);
        }
    }

    fn next_hint_character(&mut self) -> Option<char> {
        if let Some(character) = self.retry_chars.pop() {
            return Some(character);
        }
        let character = *self.password_chars.get(self.next_char_index)?;
        self.next_char_index += 1;
        Some(character)
    }

    fn hint_dispatch_complete(&self) -> bool {
        self.next_char_index >= self.password_chars.len() && self.retry_chars.is_empty()
    }

    /// The password phase opens once every distinct hint hash is resolved:
    /// cracked, or exhausted because all character tasks are accounted for.
    fn hint_phase_resolved(&self) -> bool {
        self.cracked_hints.len() == self.hint_hash_set.len()
            || self.chars_accounted >= self.password_chars.len()
    }

    /// Offer work to every free worker, by priority: hint-elimination
    /// tasks while the character cursor runs, then password-search tasks
    /// once the hint phase is resolved. Workers with no eligible work stay
    /// free.
    async fn dispatch(&mut self) {
        if !self.loading_complete {
            return;
        }
        let mut still_free = Vec::new();
        while let Some(worker) = self.free_workers.pop() {
            if let Some(character) = self.next_hint_character() {
                self.send_hint_task(&worker, character).await;
                self.in_flight.insert(worker, InFlight::Hint(character));
            } else if self.hint_phase_resolved() && !self.to_crack.is_empty() {
                let record = self.to_crack.pop_front().expect("queue checked non-empty");
                self.send_crack_task(&worker, &record).await;
                self.in_flight.insert(worker, InFlight::Crack(record));
            } else {
                still_free.push(worker);
            }
        }
        self.free_workers = still_free;
    }

    /// Push the knowledge a hint task needs, then the task itself. The
    /// hint-hash set travels as a bounded run of batch messages; per-pair
    /// ordering guarantees the worker has merged them before the task
    /// arrives.
    async fn send_hint_task(&self, worker: &ActorPath, character: char) {
        self.send_to(
            worker,
            Envelope::PasswordAlphabet {
                chars: self.password_chars.clone(),
            },
        )
        .await;
        for batch in self.hint_hashes.chunks(self.config.chunk_batch_size.max(1)) {
            self.send_to(
                worker,
                Envelope::HintHashes {
                    hashes: batch.to_vec(),
                },
            )
            .await;
        }
        debug!("dispatching hint task {:?} to {}", character, worker);
        self.send_to(worker, Envelope::HintTask { character }).await;
    }

    async fn send_crack_task(&self, worker: &ActorPath, record: &Record) {
        let entries: Vec<(String, String)> = self
            .cracked_hints
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for batch in entries.chunks(self.config.chunk_batch_size.max(1)) {
            self.send_to(
                worker,
                Envelope::CrackedHints {
                    entries: batch.iter().cloned().collect(),
                },
            )
            .await;
        }
        debug!("dispatching record {} to {}", record.name, worker);
        self.send_to(
            worker,
            Envelope::CrackTask {
                record: record.clone(),
            },
        )
        .await;
    }

    /// The run is over when loading finished, the hint cursor is spent,
    /// the queue is drained and every registered worker is free again.
    async fn maybe_terminate(&mut self) -> bool {
        let done = self.running
            && self.loading_complete
            && self.hint_dispatch_complete()
            && self.to_crack.is_empty()
            && self.in_flight.is_empty()
            && self.free_workers.len() == self.workers.len();
        if !done {
            return false;
        }
        self.terminate().await;
        true
    }

    /// Flush the collector, stop every component, report elapsed time.
    async fn terminate(&mut self) {
        let elapsed = self
            .start_time
            .map(|start| start.elapsed())
            .unwrap_or_default();

        self.send(self.collector.clone(), Envelope::Print).await;
        self.send(self.reader.clone(), Envelope::Shutdown).await;
        self.send(self.collector.clone(), Envelope::Shutdown).await;
        for worker in std::mem::take(&mut self.workers) {
            self.send(worker, Envelope::Shutdown).await;
        }
        self.free_workers.clear();
        self.running = false;

        info!("cracking run finished in {} ms", elapsed.as_millis());
        self.shutdown.cancel();
    }

    async fn send(&self, receiver: ActorPath, envelope: Envelope) {
        if let Err(e) = self
            .transport
            .send(self.path.clone(), receiver, envelope)
            .await
        {
            error!("coordinator send failed: {}", e);
        }
    }

    async fn send_to(&self, receiver: &ActorPath, envelope: Envelope) {
        self.send(receiver.clone(), envelope).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::messages::PasswordOutcome;
    use crate::cluster::types::{COLLECTOR, COORDINATOR, READER};
    use crate::transport::Router;
    use hashbreak_common::hash_hex;

    struct Harness {
        coordinator: Coordinator,
        worker_rx: Vec<mpsc::UnboundedReceiver<Delivery>>,
        workers: Vec<ActorPath>,
        reader_rx: mpsc::UnboundedReceiver<Delivery>,
        collector_rx: mpsc::UnboundedReceiver<Delivery>,
        shutdown: CancellationToken,
    }

    /// A coordinator wired to local stub mailboxes, driven by calling its
    /// handlers directly.
    async fn harness(worker_count: usize, config: ClusterConfig) -> Harness {
        let node = "test-node".to_string();
        let router = Router::default();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let transport = Arc::new(Transport::new(
            node.clone(),
            config.frame_size,
            router.clone(),
            events_tx,
            shutdown.clone(),
        ));

        let (reader_tx, reader_rx) = mpsc::unbounded_channel();
        router.register(READER, reader_tx).await;
        let (collector_tx, collector_rx) = mpsc::unbounded_channel();
        router.register(COLLECTOR, collector_tx).await;

        let mut worker_rx = Vec::new();
        let mut workers = Vec::new();
        for i in 0..worker_count {
            let name = format!("worker-{i}");
            let (tx, rx) = mpsc::unbounded_channel();
            router.register(name.clone(), tx).await;
            worker_rx.push(rx);
            workers.push(ActorPath::new(node.clone(), name));
        }

        let (_coord_tx, coord_rx) = mpsc::unbounded_channel();
        let (_member_tx, member_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(
            ActorPath::new(node.clone(), COORDINATOR),
            ActorPath::new(node.clone(), READER),
            ActorPath::new(node, COLLECTOR),
            transport,
            config,
            coord_rx,
            member_rx,
            shutdown.clone(),
        );

        Harness {
            coordinator,
            worker_rx,
            workers,
            reader_rx,
            collector_rx,
            shutdown,
        }
    }

    fn record(id: u32, alphabet: &str) -> Record {
        Record {
            id,
            name: format!("user-{id}"),
            alphabet: alphabet.chars().collect(),
            password_length: 3,
            password_hash: hash_hex("abc"),
            hint_hashes: vec![hash_hex("bcd")],
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        while let Ok(delivery) = rx.try_recv() {
            envelopes.push(delivery.envelope);
        }
        envelopes
    }

    async fn register_all(h: &mut Harness) {
        for worker in h.workers.clone() {
            h.coordinator.on_register(worker).await;
        }
    }

    #[tokio::test]
    async fn test_no_password_task_before_hint_cursor_finishes() {
        let mut h = harness(3, ClusterConfig::default()).await;
        h.coordinator.on_start().await;
        register_all(&mut h).await;

        // Two records over a 4-character alphabet, then end of input.
        h.coordinator
            .on_batch(vec![record(1, "abcd"), record(2, "abcd")])
            .await;
        h.coordinator.on_batch(Vec::new()).await;

        // All three free workers must be busy with hint tasks, and no
        // crack task may exist anywhere while the cursor has not reached
        // the end of the alphabet.
        let mut hint_tasks = 0;
        for rx in &mut h.worker_rx {
            for envelope in drain(rx) {
                match envelope {
                    Envelope::HintTask { .. } => hint_tasks += 1,
                    Envelope::CrackTask { .. } => panic!("password task issued during hint phase"),
                    Envelope::PasswordAlphabet { .. }
                    | Envelope::HintHashes { .. }
                    | Envelope::CrackedHints { .. } => {}
                    other => panic!("unexpected worker message: {}", other.manifest()),
                }
            }
        }
        assert_eq!(hint_tasks, 3);
        assert_eq!(h.coordinator.next_char_index, 3);
    }

    #[tokio::test]
    async fn test_knowledge_precedes_the_task_in_order() {
        let mut h = harness(1, ClusterConfig::default()).await;
        h.coordinator.on_start().await;
        register_all(&mut h).await;
        h.coordinator.on_batch(vec![record(1, "ab")]).await;
        h.coordinator.on_batch(Vec::new()).await;

        let envelopes = drain(&mut h.worker_rx[0]);
        let position = |manifest: &str| {
            envelopes
                .iter()
                .position(|e| e.manifest() == manifest)
                .unwrap_or_else(|| panic!("{manifest} not sent"))
        };
        assert!(position("PasswordAlphabet") < position("HintTask"));
        assert!(position("HintHashes") < position("HintTask"));
    }

    #[tokio::test]
    async fn test_full_run_reaches_termination() {
        let mut h = harness(2, ClusterConfig::default()).await;
        h.coordinator.on_start().await;
        register_all(&mut h).await;

        // One record, alphabet "ab": two hint character tasks, then one
        // password task, then termination.
        let mut rec = record(1, "ab");
        rec.password_length = 2;
        rec.password_hash = hash_hex("ab");
        rec.hint_hashes = vec![hash_hex("a")];
        h.coordinator.on_batch(vec![rec]).await;
        h.coordinator.on_batch(Vec::new()).await;

        let workers = h.workers.clone();
        // Both workers reply to their hint tasks; worker 0 finds the hint.
        let found = HashMap::from([(hash_hex("a"), "a".to_string())]);
        assert!(
            !h.coordinator
                .on_hint_results(workers[0].clone(), 'b', found, None)
                .await
        );
        assert!(
            !h.coordinator
                .on_hint_results(workers[1].clone(), 'a', HashMap::new(), None)
                .await
        );

        // The password task goes to exactly one worker.
        let mut crack_worker = None;
        for (i, rx) in h.worker_rx.iter_mut().enumerate() {
            if drain(rx)
                .iter()
                .any(|e| matches!(e, Envelope::CrackTask { .. }))
            {
                crack_worker = Some(i);
            }
        }
        let crack_worker = crack_worker.expect("no password task dispatched");

        let result = CrackResult {
            record_id: 1,
            name: "user-1".into(),
            outcome: PasswordOutcome::Found {
                password: "ab".into(),
            },
        };
        // The final reply drains the queue with all workers free.
        assert!(
            h.coordinator
                .on_crack_result(workers[crack_worker].clone(), result)
                .await
        );
        assert!(h.shutdown.is_cancelled());

        // Reader and every worker received a shutdown; the collector got
        // the result line, the print command and a shutdown.
        assert!(
            drain(&mut h.reader_rx)
                .iter()
                .any(|e| matches!(e, Envelope::Shutdown))
        );
        let collector_msgs = drain(&mut h.collector_rx);
        assert!(
            collector_msgs
                .iter()
                .any(|e| matches!(e, Envelope::Collect { line } if line.contains("Cracked")))
        );
        assert!(collector_msgs.iter().any(|e| matches!(e, Envelope::Print)));
        assert!(
            collector_msgs
                .iter()
                .any(|e| matches!(e, Envelope::Shutdown))
        );
    }

    #[tokio::test]
    async fn test_deregistration_shrinks_both_sets_and_run_still_terminates() {
        let mut h = harness(2, ClusterConfig::default()).await;
        // Give worker 1 its own node so removal is selective. Sends to it
        // fail at the transport (no such peer), which the coordinator only
        // logs; this harness never observes that mailbox anyway.
        h.workers[1] = ActorPath::new("other-node", "worker-1");
        h.coordinator.on_start().await;
        register_all(&mut h).await;

        let mut rec = record(1, "ab");
        rec.password_length = 2;
        rec.password_hash = hash_hex("ab");
        rec.hint_hashes = vec![hash_hex("a")];
        h.coordinator.on_batch(vec![rec]).await;
        h.coordinator.on_batch(Vec::new()).await;
        assert_eq!(h.coordinator.workers.len(), 2);
        assert_eq!(h.coordinator.in_flight.len(), 2);

        // Worker 1's node dies mid-task: both sets shrink by one, its hint
        // task is written off, and nothing further is sent to it.
        let terminated = h.coordinator.on_node_removed("other-node").await;
        assert!(!terminated);
        assert_eq!(h.coordinator.workers.len(), 1);
        assert!(
            !h.coordinator
                .workers
                .iter()
                .any(|w| w.node == "other-node")
        );
        assert!(
            !h.coordinator
                .free_workers
                .iter()
                .any(|w| w.node == "other-node")
        );

        // The surviving worker drains the run: hint reply (its own task),
        // then the lost task is already written off, then the crack reply.
        let survivor = h.workers[0].clone();
        let found = HashMap::from([(hash_hex("a"), "a".to_string())]);
        h.coordinator
            .on_hint_results(survivor.clone(), 'b', found, None)
            .await;
        let result = CrackResult {
            record_id: 1,
            name: "user-1".into(),
            outcome: PasswordOutcome::Found {
                password: "ab".into(),
            },
        };
        assert!(h.coordinator.on_crack_result(survivor, result).await);
    }

    #[tokio::test]
    async fn test_empty_input_terminates_immediately() {
        let mut h = harness(1, ClusterConfig::default()).await;
        h.coordinator.on_start().await;
        register_all(&mut h).await;
        assert!(h.coordinator.on_batch(Vec::new()).await);
        assert!(h.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_redelivery_requeues_lost_work() {
        let config = ClusterConfig {
            redeliver_on_loss: true,
            ..ClusterConfig::default()
        };
        let mut h = harness(1, config).await;
        h.workers[0] = ActorPath::new("other-node", "worker-0");
        h.coordinator.on_start().await;
        h.coordinator.on_register(h.workers[0].clone()).await;
        h.coordinator.on_batch(vec![record(1, "abcd")]).await;
        h.coordinator.on_batch(Vec::new()).await;

        // The lone worker holds a hint task; losing it must re-queue the
        // character rather than writing it off.
        assert!(!h.coordinator.on_node_removed("other-node").await);
        assert_eq!(h.coordinator.retry_chars.len(), 1);
        assert_eq!(h.coordinator.chars_accounted, 0);
    }
}
