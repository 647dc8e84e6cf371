//! Hashing helpers

use sha2::{Digest, Sha256};

/// Calculate SHA256 hash and return as hex string
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// First `len` hex characters of the SHA256 digest, for log fields and labels
pub fn short_hash(data: &str, len: usize) -> String {
    let mut full = sha256_hex(data);
    full.truncate(len.min(full.len()));
    full
}
