//! Custody Digest - Content digest computation and comparison
//!
//! Integrity verification recomputes a SHA-256 digest over the exact byte
//! sequence of a file and compares it to the digest recorded at upload time.

#![deny(unsafe_code)]

use sha2::{Digest, Sha256};

/// Result of comparing freshly computed content against a reference digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestComparison {
    Match,
    Mismatch,
}

impl DigestComparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Compute the lowercase hex SHA-256 digest of a byte sequence.
/// Deterministic and stable across calls.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compare content against a reference digest. The reference is matched
/// case-insensitively; stored digests are not guaranteed lowercase.
pub fn verify(bytes: &[u8], reference: &str) -> DigestComparison {
    if sha256_hex(bytes).eq_ignore_ascii_case(reference) {
        DigestComparison::Match
    } else {
        DigestComparison::Mismatch
    }
}
