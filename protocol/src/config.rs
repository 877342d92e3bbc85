//! # Protocol Configuration & Constants
//!
//! Every fixed value the chain depends on lives here. Changing any of the
//! block-format constants after a chain has been written means old blocks
//! stop validating, so treat them as frozen.

// ---------------------------------------------------------------------------
// Block Format
// ---------------------------------------------------------------------------

/// Body of the genesis block. Every chain starts with this exact marker at
/// height 0.
pub const GENESIS_BODY: &str = "Genesis Block";

/// Height of the genesis block.
pub const GENESIS_HEIGHT: u64 = 0;

/// Digest length in bytes. SHA-256 produces 32.
pub const HASH_LENGTH: usize = 32;

/// Name of the hash primitive, for logs and version output.
pub const HASH_FUNCTION: &str = "SHA-256";

/// Revision of the JSON record layout this build reads and writes. Records
/// do not carry it; it is only reported by `hashchain-node version`.
pub const RECORD_FORMAT_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// sled tree holding blocks keyed by big-endian height.
pub const BLOCKS_TREE: &str = "blocks";

/// Default data directory for the node, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "./chaindata";

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 8000;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9742;

// ---------------------------------------------------------------------------
// Demo Sequence
// ---------------------------------------------------------------------------

/// Number of blocks the demo sequence appends.
pub const DEMO_BLOCK_COUNT: u64 = 10;

/// Heights whose bodies the demo sequence overwrites out of band.
pub const DEMO_TAMPERED_HEIGHTS: [u64; 2] = [5, 8];

/// Replacement body the demo sequence writes into tampered blocks.
pub const DEMO_TAMPER_BODY: &str = "Testing Error Functionality";
