//! # Chain Engine
//!
//! Owns one chain inside one [`BlockStore`]: writes genesis, appends blocks,
//! answers height and lookup queries, and re-verifies what is on disk.
//!
//! ## States
//!
//! ```text
//!  uninitialized ──initialize()──▶ initialized ──append()──▶ initialized
//!  (store empty)                   (genesis at 0)             (height + 1)
//! ```
//!
//! `initialize` is the only way genesis gets written, and calling it on an
//! initialized chain does nothing. `append` on an empty store is refused.
//!
//! ## Validation
//!
//! Two checks, both read-only against the store:
//!
//! 1. **Self-hash** - recompute a block's digest from its stored fields and
//!    compare to its stored `hash`. Catches edits to any field.
//! 2. **Linkage** - for every height h > 0, block h's `previous_block_hash`
//!    must equal block h-1's `hash`. Catches edits that also re-sealed.
//!
//! Failures are reported as data in a [`ChainReport`], never as errors, so
//! one call always returns the complete picture.
//!
//! ## Writers
//!
//! Height assignment is read-then-write. The engine serializes its own
//! writers through an internal mutex, so one engine is safe to share. Two
//! engines over the same store are not, and nothing here detects that.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::block::{Block, BlockCodecError, BlockHash};
use super::db::{BlockStore, StoreError};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors from chain engine operations.
///
/// Validation failures are not errors; see [`ChainReport`].
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The underlying store failed a read or write. Nothing was retried.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// No block exists at the requested height.
    #[error("block #{0} not found")]
    NotFound(u64),

    /// A stored record could not be decoded as a block.
    #[error("block #{height} is corrupt: {source}")]
    Corrupt {
        height: u64,
        #[source]
        source: BlockCodecError,
    },

    /// The store holds no genesis block yet.
    #[error("chain is not initialized; no genesis block")]
    Uninitialized,

    /// The tip already sits at the largest representable height.
    #[error("chain cannot grow past height {0}")]
    HeightOverflow(u64),
}

pub type ChainResult<T> = Result<T, ChainError>;

// ---------------------------------------------------------------------------
// Validation Report
// ---------------------------------------------------------------------------

/// Why a height was flagged by [`ChainEngine::validate_chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Stored `hash` does not match the digest of the stored fields.
    HashMismatch,
    /// `previous_block_hash` does not match the previous block's `hash`, or
    /// the previous block could not be read.
    BrokenLink,
    /// No record at this height, although a higher height exists. A run of
    /// empty heights is one fault; see [`BlockFault::through`].
    Missing,
    /// The record at this height is not a decodable block.
    Malformed,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultKind::HashMismatch => "hash mismatch",
            FaultKind::BrokenLink => "broken link",
            FaultKind::Missing => "missing",
            FaultKind::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// One failed check at one height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockFault {
    pub height: u64,
    pub kind: FaultKind,
    /// Last height of a [`FaultKind::Missing`] run that spans more than
    /// `height` alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub through: Option<u64>,
}

impl BlockFault {
    pub fn new(height: u64, kind: FaultKind) -> Self {
        Self {
            height,
            kind,
            through: None,
        }
    }

    /// A run of empty heights `first..=last`.
    pub fn missing(first: u64, last: u64) -> Self {
        Self {
            height: first,
            kind: FaultKind::Missing,
            through: (last > first).then_some(last),
        }
    }
}

/// Outcome of a full chain validation.
///
/// Faults are kept in the order they were found. A height that fails both the
/// self-hash and the linkage check appears twice. A run of empty heights is a
/// single fault listed at its first height.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    /// Number of stored records examined.
    pub checked: u64,
    /// Every failed check.
    pub faults: Vec<BlockFault>,
}

impl ChainReport {
    /// `true` when no check failed.
    pub fn is_valid(&self) -> bool {
        self.faults.is_empty()
    }

    /// Heights of all faults, in recording order, duplicates included.
    pub fn invalid_heights(&self) -> Vec<u64> {
        self.faults.iter().map(|f| f.height).collect()
    }

    /// The `(valid, invalid heights)` pair.
    pub fn into_parts(self) -> (bool, Vec<u64>) {
        let heights = self.invalid_heights();
        (heights.is_empty(), heights)
    }

    fn record(&mut self, height: u64, kind: FaultKind) {
        warn!(height, %kind, "block failed validation");
        self.faults.push(BlockFault::new(height, kind));
    }

    fn record_gap(&mut self, first: u64, last: u64) {
        warn!(first, last, "heights missing from the store");
        self.faults.push(BlockFault::missing(first, last));
    }
}

/// Result of [`ChainEngine::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// The store was empty; this genesis block was written.
    Created(Block),
    /// The store already held a chain up to `height`; nothing was written.
    Existing { height: u64 },
}

// ---------------------------------------------------------------------------
// ChainEngine
// ---------------------------------------------------------------------------

/// The chain engine.
///
/// Generic over the store so tests can run against [`super::MemoryStore`] and
/// nodes against [`super::SledStore`].
pub struct ChainEngine<S> {
    store: S,
    /// Serializes `initialize` and `append`.
    writer: Mutex<()>,
}

impl<S: BlockStore> ChainEngine<S> {
    /// Wrap a store. Performs no I/O; call [`initialize`](Self::initialize)
    /// before appending.
    pub fn new(store: S) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
        }
    }

    /// Wrap a store and make sure it holds a genesis block.
    pub fn open(store: S) -> ChainResult<Self> {
        let engine = Self::new(store);
        engine.initialize()?;
        Ok(engine)
    }

    /// Returns a reference to the underlying store.
    ///
    /// Writing through this bypasses the engine entirely. It exists for
    /// tooling and for tests that tamper with stored blocks on purpose.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write the genesis block if the store is empty; otherwise do nothing.
    pub fn initialize(&self) -> ChainResult<InitOutcome> {
        let _writer = self.writer.lock();

        if let Some(height) = self.store.last_height()? {
            debug!(height, "chain already initialized");
            return Ok(InitOutcome::Existing { height });
        }

        let genesis = Block::genesis(now());
        self.persist(&genesis)?;
        info!(hash = %genesis.hash, "genesis block written");
        Ok(InitOutcome::Created(genesis))
    }

    /// Seal `body` into a new block on top of the current tip and persist it.
    ///
    /// The block is fully built and hashed in memory before the single store
    /// write, so a failure leaves the chain exactly as it was.
    pub fn append(&self, body: Value) -> ChainResult<Block> {
        let _writer = self.writer.lock();

        let tip = self.height()?.ok_or(ChainError::Uninitialized)?;
        let height = tip.checked_add(1).ok_or(ChainError::HeightOverflow(tip))?;
        let previous = self.get_block(tip)?;

        let block = Block::new(height, body, now(), previous.hash).seal();
        self.persist(&block)?;

        info!(height = block.height, hash = %block.hash, "block appended");
        Ok(block)
    }

    /// Highest occupied height, or `None` for an empty store.
    pub fn height(&self) -> ChainResult<Option<u64>> {
        Ok(self.store.last_height()?)
    }

    /// Number of stored records, counted by the store.
    pub fn block_count(&self) -> ChainResult<u64> {
        Ok(self.store.count()?)
    }

    /// Fetch and decode the block at `height`.
    pub fn get_block(&self, height: u64) -> ChainResult<Block> {
        let bytes = self.store.get(height)?.ok_or(ChainError::NotFound(height))?;
        Block::from_bytes(&bytes).map_err(|source| ChainError::Corrupt { height, source })
    }

    /// The block at the current tip, or `None` for an empty store.
    pub fn latest_block(&self) -> ChainResult<Option<Block>> {
        match self.height()? {
            Some(height) => self.get_block(height).map(Some),
            None => Ok(None),
        }
    }

    /// Recompute the digest of the block at `height` and compare it to the
    /// stored `hash`.
    ///
    /// A record that no longer decodes counts as invalid, not as an error.
    pub fn validate_block(&self, height: u64) -> ChainResult<bool> {
        match self.get_block(height) {
            Ok(block) => Ok(self_hash_matches(&block)),
            Err(ChainError::Corrupt { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check every stored block in height order: self-hash, then linkage to
    /// the previous block.
    ///
    /// Only occupied heights are visited, so the cost follows the number of
    /// records rather than the value of the highest key. Store failures abort
    /// with an error. Everything else ends up in the report.
    pub fn validate_chain(&self) -> ChainResult<ChainReport> {
        let mut report = ChainReport::default();
        let mut expected = 0u64;
        let mut previous: Option<Block> = None;

        for height in self.store.heights()? {
            report.checked += 1;

            if height > expected {
                report.record_gap(expected, height - 1);
                previous = None;
            }

            let current = match self.get_block(height) {
                Ok(block) => Some(block),
                Err(ChainError::NotFound(_)) => {
                    report.record(height, FaultKind::Missing);
                    None
                }
                Err(ChainError::Corrupt { .. }) => {
                    report.record(height, FaultKind::Malformed);
                    None
                }
                Err(e) => return Err(e),
            };

            if let Some(block) = &current {
                if !self_hash_matches(block) {
                    report.record(height, FaultKind::HashMismatch);
                }
                if height > 0 {
                    let linked = previous
                        .as_ref()
                        .is_some_and(|prev| block.previous_block_hash == prev.hash);
                    if !linked {
                        report.record(height, FaultKind::BrokenLink);
                    }
                }
            }

            previous = current;
            match height.checked_add(1) {
                Some(next) => expected = next,
                None => break,
            }
        }

        if report.is_valid() {
            info!(blocks = report.checked, "chain is valid");
        } else {
            warn!(
                blocks = report.checked,
                faults = report.faults.len(),
                heights = ?report.invalid_heights(),
                "chain validation found errors"
            );
        }
        Ok(report)
    }

    fn persist(&self, block: &Block) -> ChainResult<()> {
        let bytes = block.to_bytes().map_err(|source| ChainError::Corrupt {
            height: block.height,
            source,
        })?;
        self.store.put(block.height, &bytes)?;
        Ok(())
    }
}

fn self_hash_matches(block: &Block) -> bool {
    let expected = block.seal_hash();
    if block.hash == expected {
        true
    } else {
        debug!(
            height = block.height,
            stored = %block.hash,
            computed = %expected,
            "block hash mismatch"
        );
        false
    }
}

/// Current Unix time in seconds.
fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GENESIS_BODY;
    use crate::storage::db::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn chain_with(n: u64) -> ChainEngine<MemoryStore> {
        let chain = ChainEngine::open(MemoryStore::new()).expect("open chain");
        for i in 0..n {
            chain.append(json!(format!("Test block {i}"))).expect("append");
        }
        chain
    }

    /// Overwrite a stored block without going through the engine.
    fn overwrite(chain: &ChainEngine<MemoryStore>, block: &Block) {
        chain
            .store()
            .put(block.height, &block.to_bytes().unwrap())
            .unwrap();
    }

    #[test]
    fn initialize_writes_genesis_once() {
        let chain = ChainEngine::new(MemoryStore::new());
        assert_eq!(chain.height().unwrap(), None);

        let created = chain.initialize().unwrap();
        let InitOutcome::Created(genesis) = created else {
            panic!("expected genesis to be created");
        };
        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.body, json!(GENESIS_BODY));
        assert!(genesis.previous_block_hash.is_empty());
        assert_eq!(chain.height().unwrap(), Some(0));

        let before = chain.store().get(0).unwrap();
        assert_eq!(chain.initialize().unwrap(), InitOutcome::Existing { height: 0 });
        assert_eq!(chain.store().get(0).unwrap(), before);
        assert_eq!(chain.height().unwrap(), Some(0));
    }

    #[test]
    fn append_before_initialize_is_refused() {
        let chain = ChainEngine::new(MemoryStore::new());
        assert!(matches!(
            chain.append(json!("too early")),
            Err(ChainError::Uninitialized)
        ));
        assert_eq!(chain.block_count().unwrap(), 0);
    }

    #[test]
    fn append_links_to_previous_block() {
        let chain = chain_with(0);
        let a = chain.append(json!("A")).unwrap();
        let b = chain.append(json!("B")).unwrap();

        assert_eq!(a.height, 1);
        assert_eq!(b.height, 2);
        assert_eq!(a.previous_block_hash, chain.get_block(0).unwrap().hash);
        assert_eq!(b.previous_block_hash, a.hash);
        assert!(a.verify_hash() && b.verify_hash());
        assert_eq!(chain.get_block(2).unwrap(), b);
    }

    #[test]
    fn height_tracks_appends() {
        let chain = chain_with(7);
        assert_eq!(chain.height().unwrap(), Some(7));
        assert_eq!(chain.block_count().unwrap(), 8);
        assert_eq!(chain.latest_block().unwrap().unwrap().height, 7);
    }

    #[test]
    fn get_block_missing_height_is_not_found() {
        let chain = chain_with(1);
        assert!(matches!(chain.get_block(5), Err(ChainError::NotFound(5))));
        assert!(matches!(chain.validate_block(5), Err(ChainError::NotFound(5))));
    }

    #[test]
    fn get_block_corrupt_record() {
        let chain = chain_with(1);
        chain.store().put(1, b"{ not a block").unwrap();

        assert!(matches!(
            chain.get_block(1),
            Err(ChainError::Corrupt { height: 1, .. })
        ));
        assert!(!chain.validate_block(1).unwrap());
    }

    #[test]
    fn fresh_chain_validates() {
        let chain = chain_with(10);
        for h in 0..=10 {
            assert!(chain.validate_block(h).unwrap());
        }
        let report = chain.validate_chain().unwrap();
        assert_eq!(report.checked, 11);
        assert_eq!(report.into_parts(), (true, vec![]));
    }

    #[test]
    fn empty_store_validates_trivially() {
        let chain = ChainEngine::new(MemoryStore::new());
        let report = chain.validate_chain().unwrap();
        assert!(report.is_valid());
        assert_eq!(report.checked, 0);
    }

    #[test]
    fn body_tamper_flags_only_that_height() {
        let chain = chain_with(2);
        let mut block = chain.get_block(1).unwrap();
        block.body = json!("forged");
        overwrite(&chain, &block);

        assert!(!chain.validate_block(1).unwrap());
        assert!(chain.validate_block(2).unwrap());

        let report = chain.validate_chain().unwrap();
        assert_eq!(
            report.faults,
            vec![BlockFault::new(1, FaultKind::HashMismatch)]
        );
        assert_eq!(report.into_parts(), (false, vec![1]));
    }

    #[test]
    fn resealed_tamper_breaks_the_next_link() {
        let chain = chain_with(2);
        let mut block = chain.get_block(1).unwrap();
        block.body = json!("forged");
        let block = block.seal();
        overwrite(&chain, &block);

        // Block 1 is self-consistent now; block 2 no longer points at it.
        let report = chain.validate_chain().unwrap();
        assert_eq!(
            report.faults,
            vec![BlockFault::new(2, FaultKind::BrokenLink)]
        );
    }

    #[test]
    fn height_failing_both_checks_is_recorded_twice() {
        let chain = chain_with(3);
        let mut block = chain.get_block(2).unwrap();
        block.previous_block_hash = BlockHash([0x42; 32]);
        overwrite(&chain, &block);

        let report = chain.validate_chain().unwrap();
        assert_eq!(report.invalid_heights(), vec![2, 2]);
        assert_eq!(report.faults[0].kind, FaultKind::HashMismatch);
        assert_eq!(report.faults[1].kind, FaultKind::BrokenLink);
    }

    #[test]
    fn gap_in_heights_is_reported_as_missing() {
        let chain = chain_with(1);
        let orphan = Block::new(3, json!("orphan"), 1, BlockHash([9u8; 32])).seal();
        overwrite(&chain, &orphan);

        let report = chain.validate_chain().unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(
            report.faults,
            vec![
                BlockFault::missing(2, 2),
                BlockFault::new(3, FaultKind::BrokenLink),
            ]
        );
        assert_eq!(report.invalid_heights(), vec![2, 3]);
    }

    #[test]
    fn far_away_stray_record_is_one_gap() {
        let chain = chain_with(0);
        let stray = Block::new(3_000_000, json!("stray"), 1, BlockHash([9u8; 32])).seal();
        overwrite(&chain, &stray);

        let report = chain.validate_chain().unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(
            report.faults,
            vec![
                BlockFault::missing(1, 2_999_999),
                BlockFault::new(3_000_000, FaultKind::BrokenLink),
            ]
        );
        assert_eq!(report.invalid_heights(), vec![1, 3_000_000]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["faults"][0]["through"], json!(2_999_999u64));
        assert!(json["faults"][1].get("through").is_none());
    }

    #[test]
    fn missing_genesis_is_reported_as_gap() {
        let chain = chain_with(3);
        let stored = chain.store().heights().unwrap();
        assert_eq!(stored, vec![0, 1, 2, 3]);

        let store = MemoryStore::new();
        for h in 1..=3 {
            store.put(h, &chain.store().get(h).unwrap().unwrap()).unwrap();
        }
        let headless = ChainEngine::new(store);

        let report = headless.validate_chain().unwrap();
        assert_eq!(
            report.faults,
            vec![
                BlockFault::missing(0, 0),
                BlockFault::new(1, FaultKind::BrokenLink),
            ]
        );
    }

    #[test]
    fn append_at_max_height_is_refused() {
        let chain = chain_with(1);
        let genesis_before = chain.store().get(0).unwrap();
        let top = Block::new(u64::MAX, json!("top"), 1, BlockHash([3u8; 32])).seal();
        overwrite(&chain, &top);

        assert!(matches!(
            chain.append(json!("one more")),
            Err(ChainError::HeightOverflow(u64::MAX))
        ));
        assert_eq!(chain.store().get(0).unwrap(), genesis_before);
        assert_eq!(chain.block_count().unwrap(), 3);
    }

    #[test]
    fn validation_terminates_at_max_height() {
        let chain = chain_with(0);
        let top = Block::new(u64::MAX, json!("top"), 1, BlockHash([3u8; 32])).seal();
        overwrite(&chain, &top);

        let report = chain.validate_chain().unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.invalid_heights(), vec![1, u64::MAX]);
    }

    #[test]
    fn malformed_record_is_reported_not_raised() {
        let chain = chain_with(2);
        chain.store().put(1, b"garbage").unwrap();

        let report = chain.validate_chain().unwrap();
        assert_eq!(
            report.faults,
            vec![
                BlockFault::new(1, FaultKind::Malformed),
                BlockFault::new(2, FaultKind::BrokenLink),
            ]
        );
    }

    #[test]
    fn store_outage_surfaces_as_error() {
        let chain = chain_with(1);
        chain.store().set_unavailable(true);

        assert!(matches!(chain.height(), Err(ChainError::StoreUnavailable(_))));
        assert!(matches!(chain.get_block(0), Err(ChainError::StoreUnavailable(_))));
        assert!(matches!(
            chain.append(json!("x")),
            Err(ChainError::StoreUnavailable(_))
        ));
        assert!(matches!(chain.validate_chain(), Err(ChainError::StoreUnavailable(_))));

        chain.store().set_unavailable(false);
        assert_eq!(chain.height().unwrap(), Some(1));
        assert!(chain.validate_chain().unwrap().is_valid());
    }

    #[test]
    fn failed_write_leaves_no_partial_block() {
        let chain = chain_with(2);
        let records_before: Vec<_> = (0..=2)
            .map(|h| chain.store().get(h).unwrap())
            .collect();

        chain.store().set_read_only(true);
        assert!(matches!(
            chain.append(json!("lost")),
            Err(ChainError::StoreUnavailable(_))
        ));

        assert_eq!(chain.height().unwrap(), Some(2));
        assert_eq!(chain.block_count().unwrap(), 3);
        assert!(chain.store().get(3).unwrap().is_none());
        let records_after: Vec<_> = (0..=2)
            .map(|h| chain.store().get(h).unwrap())
            .collect();
        assert_eq!(records_after, records_before);

        chain.store().set_read_only(false);
        let block = chain.append(json!("kept")).unwrap();
        assert_eq!(block.height, 3);
        assert!(chain.validate_chain().unwrap().is_valid());
    }

    #[test]
    fn concurrent_appends_through_one_engine_stay_linked() {
        let chain = Arc::new(chain_with(0));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let chain = Arc::clone(&chain);
                thread::spawn(move || {
                    for i in 0..25 {
                        chain.append(json!(format!("writer {t} block {i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread should not panic");
        }

        assert_eq!(chain.height().unwrap(), Some(100));
        assert!(chain.validate_chain().unwrap().is_valid());
    }

    #[test]
    fn report_serializes_with_reason_codes() {
        let report = ChainReport {
            checked: 3,
            faults: vec![BlockFault::new(1, FaultKind::HashMismatch)],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["faults"][0]["kind"], json!("hash_mismatch"));
        assert_eq!(json["checked"], json!(3));
    }
}
