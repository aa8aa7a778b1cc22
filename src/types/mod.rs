//! Core domain types shared across the box model, transaction model, and
//! contract engine.
//!
//! This module defines the strongly-typed hash wrapper used as the
//! backing representation for box ids, block ids, and evidence hashes,
//! together with the re-exports that make up the public surface of the
//! data model described in the engine's component design.

use serde::{Deserialize, Serialize};

pub mod block;
pub mod boxes;
pub mod contract_value;
pub mod prop;
pub mod tx;

pub use block::Block;
pub use boxes::{Box as BoxRecord, BoxCodecError, BoxId};
pub use contract_value::ContractValue;
pub use prop::{Ed25519Pub, MofN, Signature};
pub use tx::{
    ContractCreation, ContractMethodExecution, PolyTransfer, ProfileTransaction, Role,
    Transaction,
};

/// Length in bytes of all 256-bit hashes used in this crate.
pub const HASH_LEN: usize = 32;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// Used as the backing representation for box ids, block/version ids,
/// and the sentinel timestamp key. Always exactly [`HASH_LEN`] bytes.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes `H(data)`, the 32-byte BLAKE3 digest used throughout the
    /// engine for id derivation.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

/// Computes `H(data)`.
///
/// Free-function alias for [`Hash256::compute`], matching the spec's
/// notation (`H(...)`) at call sites in the box and transaction codecs.
pub fn h(data: &[u8]) -> Hash256 {
    Hash256::compute(data)
}

/// Appends a big-endian `u64` to `buf`. Every multi-byte integer the
/// engine encodes goes through this helper so the byte order stays
/// consistent across the box codec, `message_to_sign`, and the store.
pub fn push_u64_be(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn push_u32_be(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Reads the first 8 bytes of `bytes` as a big-endian `u64`.
///
/// Used to derive box nonces from a hash: `first_8_bytes_as_u64_be(H(...))`.
pub fn first_8_bytes_as_u64_be(bytes: &[u8; HASH_LEN]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(arr)
}
