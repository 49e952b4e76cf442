//! Hashbreak Common - shared building blocks for the hashbreak cluster.
//!
//! This crate holds the pieces every other crate leans on: the error
//! taxonomy, the SHA-256 digest helper used for hints and passwords,
//! and small time utilities.

pub mod digest;
pub mod error;
pub mod time;

pub use digest::hash_hex;
pub use error::{ClusterError, Result};
pub use time::{current_timestamp_millis, current_timestamp_secs};
