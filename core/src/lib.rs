//! Hashbreak Core - a master-worker password cracking cluster.
//!
//! This is the core module of the hashbreak project. A coordinator node
//! partitions hint-elimination and password-search work across stateless
//! workers, while a chunked large-message transport moves oversized
//! payloads between cluster members over a bounded frame size.

pub mod cluster;
pub mod config;
pub mod crack;
pub mod io;
pub mod transport;

pub use cluster::{ClusterNode, NodeRole};
pub use config::ClusterConfig;
