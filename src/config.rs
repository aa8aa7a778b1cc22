//! Top-level engine configuration (C8).
//!
//! Aggregates the knobs a binary embedding this engine needs to wire up
//! a node: where the box store lives on disk, and whether the engine's
//! own Prometheus registry should be created. Mirrors `ChainConfig`'s
//! role in the teacher crate, minus anything that belongs to an external
//! collaborator (consensus tuning, ML client, HTTP listener address).
//! Loading this from a file or environment is out of scope here.

use crate::store::RocksDbConfig;

/// Configuration for the engine's versioned box store.
///
/// A thin wrapper over [`RocksDbConfig`] so that `EngineConfig` has a
/// single place to grow non-RocksDB-specific store knobs later without
/// reaching into the backend's own config type everywhere.
#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    pub rocksdb: RocksDbConfig,
}

/// Whether the engine should own a Prometheus registry for its own
/// metrics. Serving `/metrics` over HTTP is an external collaborator's
/// job; this only controls whether the registry and counters exist.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Top-level configuration for the state engine.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub metrics: MetricsConfig,
}
