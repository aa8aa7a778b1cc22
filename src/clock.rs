//! Clock abstraction (C10).
//!
//! Generalizes the teacher's `current_unix_timestamp` helper into a
//! testable seam: the engine never calls `SystemTime::now()` directly,
//! so tests can supply a [`FixedClock`] and reproduce timestamp edge
//! cases (stale state, future-dated transactions) deterministically.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" for the engine's freshness check (`state.ts < now`).
pub trait Clock: Send + Sync {
    /// Current wall-clock time, in the same unit the rest of the engine
    /// uses for `ts` fields (milliseconds since the Unix epoch).
    fn now_unix_ms(&self) -> u64;
}

/// Real wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after the Unix epoch")
            .as_millis() as u64
    }
}

/// A clock pinned to a fixed instant, for deterministic tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_unix_ms(&self) -> u64 {
        self.0
    }
}
