//! # Block Stores
//!
//! The chain engine never touches a database directly. It talks to a
//! [`BlockStore`]: an ordered key-value map from block height to an opaque
//! record. Two implementations ship with the crate.
//!
//! - [`SledStore`] - persistent, built on sled's embedded B+ tree.
//! - [`MemoryStore`] - a `BTreeMap` for tests and throwaway chains, with
//!   switches that fail every call, or only writes, so error paths can be
//!   exercised.
//!
//! ## Key Layout
//!
//! | Tree     | Key              | Value              |
//! |----------|------------------|--------------------|
//! | `blocks` | `height` (8B BE) | JSON block record  |
//!
//! Heights are stored as big-endian u64 so that sled's lexicographic
//! ordering matches numeric ordering. That makes "highest height" a single
//! `last()` lookup instead of a scan over every record.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use sled::{Db, Tree};

use crate::config::BLOCKS_TREE;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid height key ({0} bytes)")]
    InvalidKey(usize),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// BlockStore
// ---------------------------------------------------------------------------

/// Ordered key-value persistence keyed by block height.
///
/// Values are opaque to the store. Implementations must be safe to share
/// across threads; the chain engine handles writer ordering itself.
pub trait BlockStore: Send + Sync {
    /// Write `value` under `height`, replacing anything already there.
    fn put(&self, height: u64, value: &[u8]) -> StoreResult<()>;

    /// Read the value under `height`. `Ok(None)` when absent.
    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>>;

    /// Highest occupied height, or `None` for an empty store.
    fn last_height(&self) -> StoreResult<Option<u64>>;

    /// Total number of stored entries. May enumerate the whole store.
    fn count(&self) -> StoreResult<u64>;

    /// Every occupied height, ascending.
    fn heights(&self) -> StoreResult<Vec<u64>>;
}

/// Encode a height as a sled key.
fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// Decode a sled key back into a height.
fn decode_height(key: &[u8]) -> StoreResult<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StoreError::InvalidKey(key.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// Persistent block store backed by sled.
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serialized writes, so a
/// `SledStore` can be shared across threads without external locking.
#[derive(Debug, Clone)]
pub struct SledStore {
    /// The underlying sled database handle.
    db: Db,
    /// Blocks indexed by height (big-endian u64 keys).
    blocks: Tree,
}

impl SledStore {
    /// Open or create a store at the given filesystem path.
    ///
    /// If the directory doesn't exist, sled creates it. An existing chain is
    /// available immediately.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary store that is removed when dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        Ok(Self { db, blocks })
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl BlockStore for SledStore {
    fn put(&self, height: u64, value: &[u8]) -> StoreResult<()> {
        self.blocks.insert(height_key(height), value)?;
        // Each block is durable before the append call returns.
        self.blocks.flush()?;
        Ok(())
    }

    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blocks.get(height_key(height))?.map(|v| v.to_vec()))
    }

    fn last_height(&self) -> StoreResult<Option<u64>> {
        match self.blocks.last()? {
            Some((key, _)) => Ok(Some(decode_height(&key)?)),
            None => Ok(None),
        }
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.blocks.len() as u64)
    }

    fn heights(&self) -> StoreResult<Vec<u64>> {
        self.blocks
            .iter()
            .keys()
            .map(|key| decode_height(&key?))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process block store.
///
/// Useful for unit tests, benchmarks, and chains that do not need to
/// survive a restart. [`MemoryStore::set_unavailable`] turns every call into
/// a [`StoreError::Unavailable`] until switched back;
/// [`MemoryStore::set_read_only`] does the same for `put` alone.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<BTreeMap<u64, Vec<u8>>>,
    unavailable: AtomicBool,
    read_only: AtomicBool,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while set, every operation fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulate a full disk: while set, reads succeed and every `put` fails.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

impl BlockStore for MemoryStore {
    fn put(&self, height: u64, value: &[u8]) -> StoreResult<()> {
        self.check()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is read-only".to_string()));
        }
        self.blocks.write().insert(height, value.to_vec());
        Ok(())
    }

    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.blocks.read().get(&height).cloned())
    }

    fn last_height(&self) -> StoreResult<Option<u64>> {
        self.check()?;
        Ok(self.blocks.read().keys().next_back().copied())
    }

    fn count(&self) -> StoreResult<u64> {
        self.check()?;
        Ok(self.blocks.read().len() as u64)
    }

    fn heights(&self) -> StoreResult<Vec<u64>> {
        self.check()?;
        Ok(self.blocks.read().keys().copied().collect())
    }
}

impl<S: BlockStore + ?Sized> BlockStore for std::sync::Arc<S> {
    fn put(&self, height: u64, value: &[u8]) -> StoreResult<()> {
        (**self).put(height, value)
    }

    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(height)
    }

    fn last_height(&self) -> StoreResult<Option<u64>> {
        (**self).last_height()
    }

    fn count(&self) -> StoreResult<u64> {
        (**self).count()
    }

    fn heights(&self) -> StoreResult<Vec<u64>> {
        (**self).heights()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
