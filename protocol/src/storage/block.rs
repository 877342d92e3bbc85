//! # Block Structure
//!
//! A block is one sealed record in the chain. It carries a caller payload,
//! its position, the time it was appended, and the digest of the block
//! before it. Its own digest seals all of that.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  Block                                           │
//! │  ├── hash: BlockHash               (SHA-256)     │
//! │  ├── height: u64                                 │
//! │  ├── body: serde_json::Value                     │
//! │  ├── time: u64                     (unix secs)   │
//! │  └── previousBlockHash: BlockHash  (EMPTY at 0)  │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! The block hash covers, in this order:
//!
//! ```text
//! height (u64 LE) || len(body) (u64 LE) || canonical_json(body)
//!     || timestamp (u64 LE) || previous_block_hash (32 bytes)
//! ```
//!
//! The `hash` field itself is never part of the preimage. Object keys in the
//! body are sorted before hashing so the same logical payload always yields
//! the same digest, whichever order a client sent the keys in.
//!
//! ## Record Format
//!
//! Blocks are stored as JSON records. Digests are lowercase hex, and the
//! empty sentinel is written as `""`.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::config::{GENESIS_BODY, GENESIS_HEIGHT, HASH_LENGTH};
use crate::crypto::hash::sha256_array;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors from encoding or decoding block records and digests.
#[derive(Debug, thiserror::Error)]
pub enum BlockCodecError {
    #[error("malformed block record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid block hash: {0}")]
    InvalidHash(String),
}

// ---------------------------------------------------------------------------
// BlockHash
// ---------------------------------------------------------------------------

/// A 32-byte SHA-256 block digest.
///
/// [`BlockHash::EMPTY`] (all zeros) is the "no hash" sentinel: the genesis
/// block's `previous_block_hash`, and the `hash` of a block that has not been
/// sealed yet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHash(pub [u8; HASH_LENGTH]);

impl BlockHash {
    /// The empty sentinel.
    pub const EMPTY: BlockHash = BlockHash([0u8; HASH_LENGTH]);

    /// Returns `true` for the empty sentinel.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Lowercase hex, 64 characters. The empty sentinel renders as zeros.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a digest from hex. The empty string parses to [`BlockHash::EMPTY`].
    pub fn from_hex(s: &str) -> Result<Self, BlockCodecError> {
        if s.is_empty() {
            return Ok(Self::EMPTY);
        }
        let bytes = hex::decode(s).map_err(|e| BlockCodecError::InvalidHash(e.to_string()))?;
        let arr: [u8; HASH_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            BlockCodecError::InvalidHash(format!(
                "expected {} bytes, got {}",
                HASH_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("BlockHash(EMPTY)")
        } else {
            write!(f, "BlockHash({})", self.to_hex())
        }
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&self.to_hex())
        }
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HashVisitor;

        impl<'de> Visitor<'de> for HashVisitor {
            type Value = BlockHash;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a hex-encoded 32-byte digest or an empty string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<BlockHash, E> {
                BlockHash::from_hex(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HashVisitor)
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One record in the chain.
///
/// A block is built unsealed (`hash == EMPTY`), then [`Block::seal`] fills in
/// the digest. After the engine persists it, nothing in this crate mutates a
/// stored block again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// SHA-256 of the preimage. Not part of its own preimage.
    pub hash: BlockHash,
    /// Position in the chain (genesis = 0).
    pub height: u64,
    /// Caller payload. A plain string for most uses, any JSON value allowed.
    pub body: Value,
    /// Unix timestamp (seconds) when the block was appended.
    #[serde(rename = "time")]
    pub timestamp: u64,
    /// Digest of the block at `height - 1`; [`BlockHash::EMPTY`] for genesis.
    pub previous_block_hash: BlockHash,
}

impl Block {
    /// Construct an unsealed block.
    pub fn new(height: u64, body: Value, timestamp: u64, previous_block_hash: BlockHash) -> Self {
        Block {
            hash: BlockHash::EMPTY,
            height,
            body,
            timestamp,
            previous_block_hash,
        }
    }

    /// Construct the sealed genesis block: height 0, the well-known
    /// [`GENESIS_BODY`] marker, and an empty previous hash.
    pub fn genesis(timestamp: u64) -> Self {
        Block::new(
            GENESIS_HEIGHT,
            Value::String(GENESIS_BODY.to_string()),
            timestamp,
            BlockHash::EMPTY,
        )
        .seal()
    }

    /// Canonical byte string the hash is computed over. Excludes `hash`.
    pub fn preimage(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(64);
        write_canonical_json(&self.body, &mut body);

        let mut preimage = Vec::with_capacity(8 + 8 + body.len() + 8 + HASH_LENGTH);
        preimage.extend_from_slice(&self.height.to_le_bytes());
        preimage.extend_from_slice(&(body.len() as u64).to_le_bytes());
        preimage.extend_from_slice(&body);
        preimage.extend_from_slice(&self.timestamp.to_le_bytes());
        preimage.extend_from_slice(self.previous_block_hash.as_bytes());
        preimage
    }

    /// Recompute the digest from the block's fields, ignoring whatever is
    /// currently stored in `hash`.
    pub fn seal_hash(&self) -> BlockHash {
        BlockHash(sha256_array(&self.preimage()))
    }

    /// Consume the block and return it with `hash` filled in.
    pub fn seal(mut self) -> Self {
        self.hash = self.seal_hash();
        self
    }

    /// Returns `true` if the stored `hash` matches the recomputed digest.
    pub fn verify_hash(&self) -> bool {
        self.hash == self.seal_hash()
    }

    /// Encode as a store record.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BlockCodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a store record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockCodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ---------------------------------------------------------------------------
// Canonical JSON
// ---------------------------------------------------------------------------

/// Compact JSON with object keys sorted, so the bytes depend only on the
/// logical value.
fn write_canonical_json(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical_json(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(Value::String(key.clone()).to_string().as_bytes());
                out.push(b':');
                write_canonical_json(item, out);
            }
            out.push(b'}');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
