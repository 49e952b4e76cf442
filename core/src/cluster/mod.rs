//! The hashbreak cluster: membership tracking, the coordinator scheduling
//! engine, the worker compute engine and per-process node assembly, all
//! communicating through the chunked transport.

pub mod coordinator;
pub mod membership;
pub mod messages;
pub mod node;
pub mod types;
pub mod worker;

pub use coordinator::Coordinator;
pub use membership::{MembershipEvent, MembershipService};
pub use messages::{CrackResult, Delivery, Envelope, PasswordOutcome};
pub use node::ClusterNode;
pub use types::{ActorPath, NodeId, NodeInfo, NodeRole, Record};
pub use worker::Worker;
