//! # Storage Module
//!
//! Everything that makes the chain a chain: the block record, the stores it
//! lives in, and the engine that appends to and audits it.
//!
//! ## Architecture
//!
//! ```text
//! block.rs  - Block structure, canonical preimage, seal/verify, record codec
//! db.rs     - BlockStore trait; sled and in-memory implementations
//! chain.rs  - ChainEngine: genesis, append, lookup, validation
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! body → ChainEngine::append → Block::seal → BlockStore::put(height, json)
//!                                                   │
//! ChainEngine::validate_chain ◀── Block::from_bytes ◀┘
//! ```
//!
//! ## Design Decisions
//!
//! 1. **SHA-256 over a canonical preimage.** The stored JSON record is not
//!    what gets hashed. The preimage is a fixed binary layout, so reformatting
//!    the record (whitespace, key order) cannot change a block's identity.
//!
//! 2. **Heights as big-endian keys.** Lexicographic order in sled equals
//!    numeric order, so the tip is one `last()` away.
//!
//! 3. **JSON on disk.** Bodies are arbitrary JSON values, and the records stay
//!    readable with any key-value inspection tool.

pub mod block;
pub mod chain;
pub mod db;

pub use block::{Block, BlockCodecError, BlockHash};
pub use chain::{
    BlockFault, ChainEngine, ChainError, ChainReport, ChainResult, FaultKind, InitOutcome,
};
pub use db::{BlockStore, MemoryStore, SledStore, StoreError, StoreResult};
