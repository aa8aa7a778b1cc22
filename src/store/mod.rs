//! Box store abstraction (C5).
//!
//! The store is a versioned key-value map from [`BoxId`] to [`BoxRecord`].
//! Every committed version is named by the id of the block that produced
//! it; [`BoxStore::rollback_to`] can unwind back to any earlier named
//! version, which the engine uses to recover from a block that fails
//! validation partway through application (§4.5, §4.6).
//!
//! Implementations: [`mem::InMemoryBoxStore`] for tests, and
//! [`rocksdb::RocksDbBoxStore`] for persistent nodes.

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryBoxStore;
pub use rocksdb::{RocksDbBoxStore, RocksDbConfig};

use crate::types::{BoxId, BoxRecord, Hash256};

/// One version's worth of state transition: boxes removed (spent) and
/// boxes appended (created), applied atomically and named by `version`.
/// `timestamp` is the committing block's timestamp, persisted alongside
/// the delta so the sentinel `H("timestamp")` value the spec describes
/// can be recovered after a rollback without replaying box state.
#[derive(Clone, Debug)]
pub struct StoreDelta {
    pub version: Hash256,
    pub timestamp: u64,
    pub removed: Vec<BoxId>,
    pub appended: Vec<BoxRecord>,
}

#[derive(Debug)]
pub enum StoreError {
    /// `commit` referenced a box id that either does not exist or whose
    /// decoded id does not match the key it is stored under.
    UnknownBox(BoxId),
    /// `rollback_to` named a version this store has no record of.
    UnknownVersion(Hash256),
    /// Underlying RocksDB error (RocksDB backend only).
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::UnknownBox(id) => write!(f, "unknown box: {id:?}"),
            StoreError::UnknownVersion(v) => write!(f, "unknown store version: {v:?}"),
            StoreError::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Abstract storage interface used by the state transition engine.
///
/// Implementations can be backed by an in-memory map, RocksDB, etc. Reads
/// are expected to be safe to call concurrently with each other; writes
/// (`commit`, `rollback_to`) go through a single engine instance (see the
/// single-writer concurrency model in the component design).
pub trait BoxStore {
    /// Fetches a box by id, if it is currently unspent.
    fn get(&self, id: &BoxId) -> Option<BoxRecord>;

    /// Atomically removes `delta.removed` and appends `delta.appended`,
    /// naming the resulting state `delta.version`. Fails without partial
    /// effect if any box in `removed` is not currently present.
    fn commit(&mut self, delta: StoreDelta) -> Result<(), StoreError>;

    /// Unwinds state back to exactly as it was immediately after
    /// `version` was committed, replaying the inverse of every later
    /// delta. A no-op if `version` is already the current head.
    fn rollback_to(&mut self, version: &Hash256) -> Result<(), StoreError>;

    /// Returns the version id most recently committed, if any.
    fn last_version_id(&self) -> Option<Hash256>;

    /// Returns the timestamp committed alongside the current head version,
    /// if any, the persisted counterpart of the spec's sentinel
    /// `H("timestamp")` key, recovered intact across a rollback.
    fn last_timestamp(&self) -> Option<u64>;
}
