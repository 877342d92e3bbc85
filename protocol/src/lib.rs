// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # hashchain - Core Library
//!
//! A single-writer, append-only chain of blocks where every block commits to
//! its predecessor through a SHA-256 digest. The chain lives in an embedded
//! key-value store, one record per height, and can be re-verified at any time
//! by re-deriving every hash from the stored fields.
//!
//! ## Architecture
//!
//! - **crypto** - The hash primitive. SHA-256, nothing fancier.
//! - **storage** - Block model, store adapters (sled and in-memory), and the
//!   chain engine that appends and validates.
//! - **config** - Protocol constants: genesis marker, tree names, defaults.
//!
//! ## Quick Tour
//!
//! ```
//! use hashchain::storage::{ChainEngine, MemoryStore};
//!
//! let chain = ChainEngine::open(MemoryStore::new()).unwrap();
//! chain.append("first payload".into()).unwrap();
//! assert_eq!(chain.height().unwrap(), Some(1));
//! assert!(chain.validate_chain().unwrap().is_valid());
//! ```
//!
//! There is exactly one writer per chain. The engine serializes its own
//! appends, but two engines pointed at the same store will race.

pub mod config;
pub mod crypto;
pub mod storage;

pub use storage::{
    Block, BlockHash, BlockStore, ChainEngine, ChainError, ChainReport, MemoryStore, SledStore,
    StoreError,
};
