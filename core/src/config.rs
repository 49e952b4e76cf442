//! Cluster configuration.
//!
//! All tunables of the work-distribution engine and the chunked transport
//! live here so that nodes across the cluster can be started from one
//! shared set of knobs.

use serde::{Deserialize, Serialize};

/// Configuration for a hashbreak cluster node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Maximum payload bytes per transport frame
    pub frame_size: usize,
    /// How many hint hashes / cracked-hint entries are grouped per message
    /// during bulk pushes to workers
    pub chunk_batch_size: usize,
    /// Largest reduced alphabet for which exhaustive password search is
    /// still attempted; larger reductions are reported as infeasible
    pub feasible_alphabet_bound: usize,
    /// Re-queue the task a worker held when it deregisters mid-task.
    /// The reference behavior is to drop such work silently.
    pub redeliver_on_loss: bool,
    /// Number of records the reader hands over per batch
    pub read_batch_size: usize,
    /// Worker actors spawned per worker node
    pub workers_per_node: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            frame_size: 8096,          // bytes per frame
            chunk_batch_size: 256,     // entries per bulk-push message
            feasible_alphabet_bound: 3,
            redeliver_on_loss: false,
            read_batch_size: 100,
            workers_per_node: num_cpus::get(),
        }
    }
}
