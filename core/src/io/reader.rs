//! The batch reader over the input file.
//!
//! The coordinator pulls records batch by batch with `ReadBatch`; the
//! reader answers every request, and an empty batch signals end of input.
//! The backing source sits behind a trait so tests can feed records
//! without touching the filesystem.

use crate::cluster::messages::{Delivery, Envelope};
use crate::cluster::types::{ActorPath, Record};
use crate::transport::Transport;
use async_trait::async_trait;
use hashbreak_common::{ClusterError, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Streams batches of raw records into the cluster.
#[async_trait]
pub trait RecordSource: Send {
    /// The next batch, at most `max_records` long. An empty batch means
    /// the input is exhausted.
    async fn next_batch(&mut self, max_records: usize) -> Result<Vec<Record>>;
}

/// Parse one `;`-separated input line:
/// `id;name;alphabet;password_length;password_hash;hint_hash;...`
pub fn parse_record(line: &str) -> Result<Record> {
    let fields: Vec<&str> = line.split(';').collect();
    if fields.len() < 5 {
        return Err(ClusterError::protocol_error(format!(
            "record line has {} fields, expected at least 5",
            fields.len()
        )));
    }

    let id = fields[0]
        .trim()
        .parse::<u32>()
        .map_err(|e| ClusterError::io_error_with_source("record id is not a number", e))?;
    let password_length = fields[3]
        .trim()
        .parse::<usize>()
        .map_err(|e| ClusterError::io_error_with_source("password length is not a number", e))?;

    Ok(Record {
        id,
        name: fields[1].trim().to_string(),
        alphabet: fields[2].trim().chars().collect(),
        password_length,
        password_hash: fields[4].trim().to_string(),
        hint_hashes: fields[5..]
            .iter()
            .map(|hash| hash.trim().to_string())
            .filter(|hash| !hash.is_empty())
            .collect(),
    })
}

/// Line-per-record file source. Malformed lines are logged and skipped so
/// one bad row does not sink the run.
pub struct LineFileSource {
    lines: Lines<BufReader<File>>,
}

impl LineFileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| {
            ClusterError::io_error_with_source(
                format!("failed to open input file {}", path.display()),
                e,
            )
        })?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }
}

#[async_trait]
impl RecordSource for LineFileSource {
    async fn next_batch(&mut self, max_records: usize) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while records.len() < max_records {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| ClusterError::io_error_with_source("failed to read input line", e))?;
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping malformed record line: {}", e),
            }
        }
        Ok(records)
    }
}

/// The reader actor: answers each `ReadBatch` with the next batch from its
/// source.
pub struct Reader {
    path: ActorPath,
    transport: Arc<Transport>,
    mailbox: mpsc::UnboundedReceiver<Delivery>,
    source: Box<dyn RecordSource>,
    batch_size: usize,
    shutdown: CancellationToken,
}

impl Reader {
    pub fn new(
        path: ActorPath,
        transport: Arc<Transport>,
        mailbox: mpsc::UnboundedReceiver<Delivery>,
        source: Box<dyn RecordSource>,
        batch_size: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            path,
            transport,
            mailbox,
            source,
            batch_size,
            shutdown,
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
                _ = self.shutdown.cancelled() => break,
            }
        }
        debug!("reader stopped");
    }

    /// Returns true once the reader should stop.
    async fn handle(&mut self, delivery: Delivery) -> bool {
        match delivery.envelope {
            Envelope::ReadBatch => {
                let records = match self.source.next_batch(self.batch_size).await {
                    Ok(records) => records,
                    Err(e) => {
                        // A broken source ends the input; the empty batch
                        // tells the coordinator loading is over.
                        error!("input source failed: {}", e);
                        Vec::new()
                    }
                };
                debug!("read batch of {} records", records.len());
                let reply = Envelope::RecordBatch { records };
                if let Err(e) = self
                    .transport
                    .send(self.path.clone(), delivery.sender, reply)
                    .await
                {
                    error!("reader reply failed: {}", e);
                }
            }
            Envelope::Shutdown => return true,
            other => warn!(
                "reader {} received unknown message: {}",
                self.path,
                other.manifest()
            ),
        }
        false
    }
}
