//! Triledger library crate.
//!
//! This crate provides the core building blocks for a transactional
//! state engine over a UTXO-like box model:
//!
//! - strongly-typed domain types (`types`): boxes, propositions,
//!   transactions, blocks,
//! - a fixed-dispatch-table contract engine (`contract`),
//! - a versioned box store (`store`),
//! - the state transition engine that ties the above together
//!   (`engine`),
//! - canonical JSON rendering for deterministic hashing (`json_canon`),
//! - and the ambient node-building blocks: configuration (`config`),
//!   the engine-wide error type (`error`), a clock abstraction
//!   (`clock`), and Prometheus metrics (`metrics`).
//!
//! Higher-level binaries can compose these pieces into a validator
//! node, a simulator, or a test harness.

pub mod clock;
pub mod config;
pub mod contract;
pub mod engine;
pub mod error;
pub mod json_canon;
pub mod metrics;
pub mod store;
pub mod types;

// Re-export top-level configuration types.
pub use config::{EngineConfig, MetricsConfig, StoreConfig};

// Re-export the state transition engine and its error type.
pub use engine::Engine;
pub use error::EngineError;

// Re-export the clock abstraction.
pub use clock::{Clock, FixedClock, SystemClock};

// Re-export box store backends.
pub use store::{BoxStore, InMemoryBoxStore, RocksDbBoxStore, RocksDbConfig, StoreDelta, StoreError};

// Re-export the contract dispatch table.
pub use contract::{ContractError, Method, MethodOutcome};

// Re-export metrics registry and engine metrics.
pub use metrics::{EngineMetrics, MetricsRegistry};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the default engine stack used by a "typical" node:
/// a RocksDB-backed box store and the real wall clock.
pub type DefaultEngine = Engine<RocksDbBoxStore, SystemClock>;
