//! # Cryptographic Primitives
//!
//! The chain needs exactly one primitive: a collision-resistant hash. We use
//! SHA-256 from the audited `sha2` crate, returned as a fixed `[u8; 32]`.

pub mod hash;

pub use hash::sha256_array;
