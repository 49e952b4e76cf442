//! Cluster identity types.
//!
//! Logical identities are carried inside message payloads so that the
//! receiving transport endpoint can deliver with correct provenance,
//! independent of the physical connection a frame arrived on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for cluster nodes
pub type NodeId = String;

/// Well-known actor name of the coordinator on a master node.
pub const COORDINATOR: &str = "coordinator";
/// Well-known actor name of the membership tracker on every node.
pub const MEMBERSHIP: &str = "membership";
/// Well-known actor name of the input reader on the master node.
pub const READER: &str = "reader";
/// Well-known actor name of the result collector on the master node.
pub const COLLECTOR: &str = "collector";

/// Logical address of an actor: the node it lives on plus its name there.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct ActorPath {
    pub node: NodeId,
    pub actor: String,
}

impl ActorPath {
    pub fn new(node: impl Into<NodeId>, actor: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            actor: actor.into(),
        }
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.actor)
    }
}

/// Role a node plays in the cluster
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
pub enum NodeRole {
    /// Runs the coordinator, reader and collector
    Master,
    /// Runs worker actors only
    Worker,
}

/// Information a node announces about itself during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct NodeInfo {
    pub node_id: NodeId,
    /// Address of the node's transport endpoint, e.g. "127.0.0.1:7700"
    pub addr: String,
    pub role: NodeRole,
}

/// One password-cracking unit, immutable once read.
///
/// A copy travels with each password-search task; the coordinator owns the
/// authoritative queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Record {
    pub id: u32,
    pub name: String,
    /// Candidate alphabet, ordered as it appeared in the input
    pub alphabet: Vec<char>,
    pub password_length: usize,
    pub password_hash: String,
    pub hint_hashes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_path_display() {
        let path = ActorPath::new("node-1", COORDINATOR);
        assert_eq!(path.to_string(), "node-1/coordinator");
    }

    #[test]
    fn test_actor_path_equality_and_hash() {
        use std::collections::HashSet;
        let a = ActorPath::new("n", "worker-0");
        let b = ActorPath::new("n", "worker-0");
        let c = ActorPath::new("n", "worker-1");
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }
}
