//! Prometheus-backed engine metrics.
//!
//! Mirrors `ConsensusMetrics::register` in the teacher crate: a set of
//! strongly-typed counters/histogram registered into a `prometheus::Registry`
//! owned by [`MetricsRegistry`].

use ::prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};

/// Engine-level Prometheus metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    /// Total number of blocks successfully applied.
    pub blocks_applied_total: IntCounter,
    /// Total number of blocks rejected by validation.
    pub blocks_rejected_total: IntCounter,
    /// Total number of `rollback_to` calls that changed the store head.
    pub rollbacks_total: IntCounter,
    /// Total number of individual transactions applied across all blocks.
    pub txs_applied_total: IntCounter,
    /// Latency of a full `apply_block` call, in seconds.
    pub block_apply_seconds: Histogram,
}

impl EngineMetrics {
    /// Registers engine metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, ::prometheus::Error> {
        let blocks_applied_total = IntCounter::with_opts(Opts::new(
            "engine_blocks_applied_total",
            "Total number of blocks successfully applied",
        ))?;
        registry.register(Box::new(blocks_applied_total.clone()))?;

        let blocks_rejected_total = IntCounter::with_opts(Opts::new(
            "engine_blocks_rejected_total",
            "Total number of blocks rejected by validation",
        ))?;
        registry.register(Box::new(blocks_rejected_total.clone()))?;

        let rollbacks_total = IntCounter::with_opts(Opts::new(
            "engine_rollbacks_total",
            "Total number of rollbacks that changed the store head",
        ))?;
        registry.register(Box::new(rollbacks_total.clone()))?;

        let txs_applied_total = IntCounter::with_opts(Opts::new(
            "engine_txs_applied_total",
            "Total number of transactions applied across all blocks",
        ))?;
        registry.register(Box::new(txs_applied_total.clone()))?;

        let block_apply_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "engine_block_apply_seconds",
                "Time to validate and commit a block, in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(block_apply_seconds.clone()))?;

        Ok(Self {
            blocks_applied_total,
            blocks_rejected_total,
            rollbacks_total,
            txs_applied_total,
            block_apply_seconds,
        })
    }
}

/// Owns a Prometheus registry and the engine's metrics. Intended to be
/// constructed once per node and shared (e.g. behind an `Arc`) with
/// whatever external collaborator mounts `/metrics`.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub engine: EngineMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, ::prometheus::Error> {
        let registry = Registry::new_custom(Some("triledger".to_string()), None)?;
        let engine = EngineMetrics::register(&registry)?;
        Ok(Self { registry, engine })
    }

    /// Encodes all metrics in this registry into Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = ::prometheus::TextEncoder::new();
        if let Err(e) = ::prometheus::Encoder::encode(&encoder, &metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = EngineMetrics::register(&registry).expect("register metrics");

        metrics.blocks_applied_total.inc();
        metrics.blocks_rejected_total.inc();
        metrics.rollbacks_total.inc();
        metrics.txs_applied_total.inc_by(3);
        metrics.block_apply_seconds.observe(0.002);

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_contains_metric_names() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.engine.blocks_applied_total.inc();
        let text = registry.gather_text();
        assert!(text.contains("engine_blocks_applied_total"));
    }
}
