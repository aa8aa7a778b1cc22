//! Metrics and instrumentation for the state engine (C9).
//!
//! Registers Prometheus counters/histograms tracking blocks applied or
//! rejected, rollbacks, and transaction throughput. Unlike the teacher's
//! `metrics::prometheus`, this module stops at the registry and a
//! `gather_text()` helper: serving `/metrics` over HTTP belongs to the
//! API layer, an external collaborator this engine doesn't own.

pub mod prometheus;

pub use prometheus::{EngineMetrics, MetricsRegistry};
