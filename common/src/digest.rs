//! SHA-256 digest helper shared by hint and password cracking.

use sha2::{Digest, Sha256};

/// Hash a candidate string with SHA-256 and return the lowercase hex digest.
///
/// Hints and password hashes in the input data are produced by exactly this
/// encoding, so digest comparison is plain string equality everywhere else.
pub fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
