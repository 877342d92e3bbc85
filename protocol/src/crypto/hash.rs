//! # Hashing Utilities
//!
//! The chain's one-way function. Every block hash is SHA-256 over the block's
//! canonical preimage, and nothing else in the crate hashes anything.
//!
//! SHA-256 was picked for compatibility with the record format the chain was
//! first written in (lowercase hex SHA-256 strings), not for speed. Collision
//! resistance is what tamper evidence rests on; we delegate all of it to
//! `sha2`.

use sha2::{Digest, Sha256};

use crate::config::HASH_LENGTH;

/// Compute the SHA-256 digest of `data` as a fixed-size array.
///
/// # Example
///
/// ```
/// use hashchain::crypto::sha256_array;
///
/// let hash = sha256_array(b"hashchain");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256_array(data: &[u8]) -> [u8; HASH_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; HASH_LENGTH];
    output.copy_from_slice(&result);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string.
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(sha256_array(b"").to_vec(), expected);
    }

    #[test]
    fn test_sha256_abc_vector() {
        assert_eq!(
            hex::encode(sha256_array(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha256_deterministic() {
        assert_eq!(sha256_array(b"block"), sha256_array(b"block"));
    }

    #[test]
    fn test_sha256_different_inputs() {
        assert_ne!(sha256_array(b"block"), sha256_array(b"Block"));
    }
}
