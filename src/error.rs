//! Engine-wide error type (C7).
//!
//! Mirrors the five error kinds in the spec's error handling design:
//! malformed input, a violated stateless invariant, a violated stateful
//! invariant, a contract dispatch failure, and an underlying store
//! failure. Hand-rolled `Display`/`Error`, following `consensus/error.rs`
//! rather than pulling in a derive-macro error crate this engine doesn't
//! otherwise need.

use std::fmt;

use crate::contract::ContractError;
use crate::store::StoreError;
use crate::types::tx::TxValidationError;

#[derive(Debug)]
pub enum EngineError {
    /// Bytes or JSON did not parse, or a transaction's shape is wrong.
    Malformed(String),
    /// A stateless invariant is violated (bad signature, fee < 0, ...).
    SemanticInvalid(String),
    /// A stateful invariant is violated: missing box, double-spend within
    /// a block, role/profile mismatch, id collision, timestamp not ahead
    /// of state, timestamp not behind wall clock.
    StateInvalid(String),
    /// A dispatched contract method raised. Per the spec's safety note,
    /// the engine only constructs this variant as an internal detail of
    /// `ContractExecutionFailed` bookkeeping; by the time dispatch runs,
    /// caller authorization has already been checked, so this surfacing
    /// as `StateInvalid` at the call site indicates a logic bug rather
    /// than a legitimate rejection path.
    ContractExecutionFailed(String),
    /// I/O failure underneath the box store; fatal, propagated as-is.
    StoreError(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Malformed(m) => write!(f, "malformed: {m}"),
            EngineError::SemanticInvalid(m) => write!(f, "semantically invalid: {m}"),
            EngineError::StateInvalid(m) => write!(f, "invalid against state: {m}"),
            EngineError::ContractExecutionFailed(m) => write!(f, "contract execution failed: {m}"),
            EngineError::StoreError(m) => write!(f, "store error: {m}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<TxValidationError> for EngineError {
    fn from(e: TxValidationError) -> Self {
        match e {
            TxValidationError::Malformed(m) => EngineError::Malformed(m),
            TxValidationError::SemanticInvalid(m) => EngineError::SemanticInvalid(m),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::StoreError(e.to_string())
    }
}

/// A `ContractError` reaching the engine means dispatch ran and failed
/// *after* stateful validation already gated caller authorization, per
/// the spec's safety note this is folded into `StateInvalid` rather than
/// kept as its own fatal class.
impl From<ContractError> for EngineError {
    fn from(e: ContractError) -> Self {
        EngineError::StateInvalid(format!("contract execution failed: {e}"))
    }
}
