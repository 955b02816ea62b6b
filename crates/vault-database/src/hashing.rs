//! Deterministic digests for equality and uniqueness checks on encrypted data.
//!
//! Not a password hash and not used for access control: the digest only
//! serves as a duplicate-detection key stored next to the ciphertext.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 of `plaintext`.
pub fn digest(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}
