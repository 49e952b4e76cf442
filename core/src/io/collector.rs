//! The result collector.
//!
//! Accumulates one line per note and dumps everything on the final print
//! command. Fire-and-forget: it never replies. An optional observer sink
//! mirrors every line, which is how tests watch a run from the outside.

use crate::cluster::messages::{Delivery, Envelope};
use crate::cluster::types::ActorPath;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Collector {
    path: ActorPath,
    mailbox: mpsc::UnboundedReceiver<Delivery>,
    shutdown: CancellationToken,
    lines: Vec<String>,
    observer: Option<mpsc::UnboundedSender<String>>,
}

impl Collector {
    pub fn new(
        path: ActorPath,
        mailbox: mpsc::UnboundedReceiver<Delivery>,
        shutdown: CancellationToken,
        observer: Option<mpsc::UnboundedSender<String>>,
    ) -> Self {
        Self {
            path,
            mailbox,
            shutdown,
            lines: Vec::new(),
            observer,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                maybe = self.mailbox.recv() => {
                    let Some(delivery) = maybe else { break };
                    if self.handle(delivery) {
                        break;
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
        debug!("collector stopped");
    }

    /// Returns true once the collector should stop.
    fn handle(&mut self, delivery: Delivery) -> bool {
        match delivery.envelope {
            Envelope::Collect { line } => {
                if let Some(observer) = &self.observer {
                    let _ = observer.send(line.clone());
                }
                self.lines.push(line);
            }
            Envelope::Print => {
                info!("--- collected {} results ---", self.lines.len());
                for line in &self.lines {
                    info!("{}", line);
                }
            }
            Envelope::Shutdown => return true,
            other => warn!(
                "collector {} received unknown message: {}",
                self.path,
                other.manifest()
            ),
        }
        false
    }
}
