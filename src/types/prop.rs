//! Propositions and signatures (C2).
//!
//! A proposition is the locking predicate on a box: either a single
//! Ed25519 public key, or an M-of-N set of keys. Verification is always
//! against a caller-supplied `message_to_sign` byte string. This module
//! has no notion of what a transaction is, only of keys and signatures.

use std::collections::BTreeSet;

use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::{push_u32_be, Hash256};

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Ed25519Pub(pub [u8; 32]);

impl Ed25519Pub {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Ed25519Pub(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, bs58::decode::Error> {
        let bytes = bs58::decode(s).into_vec()?;
        let mut arr = [0u8; 32];
        if bytes.len() == 32 {
            arr.copy_from_slice(&bytes);
        }
        Ok(Ed25519Pub(arr))
    }

    fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).ok()
    }

    /// Verifies a single detached signature against `msg` under this key.
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> bool {
        let Some(vk) = self.verifying_key() else {
            return false;
        };
        let Ok(dalek_sig) = DalekSignature::from_slice(&sig.0) else {
            return false;
        };
        vk.verify(msg, &dalek_sig).is_ok()
    }
}

impl std::fmt::Debug for Ed25519Pub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Pub({})", self.to_base58())
    }
}

/// A detached Ed25519 signature (64 bytes).
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", &self.to_base58()[..8.min(self.to_base58().len())])
    }
}

/// An M-of-N proposition: satisfied by at least `m` valid signatures from
/// distinct keys in `keys`. Every `MofN` this engine produces has `m = 1`
/// (see the REDESIGN FLAGS note on M=1 propositions), but the general
/// form is kept for forward compatibility.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MofN {
    pub m: u32,
    pub keys: BTreeSet<Ed25519Pub>,
}

impl MofN {
    pub fn new(m: u32, keys: impl IntoIterator<Item = Ed25519Pub>) -> Self {
        MofN {
            m,
            keys: keys.into_iter().collect(),
        }
    }

    /// `encode(MofN) = u32_be(m) || u32_be(n) || n·pub(32)`, keys in
    /// ascending byte order (guaranteed by the `BTreeSet`'s natural order
    /// since `Ed25519Pub`'s `Ord` compares the raw 32 bytes).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.keys.len() * 32);
        push_u32_be(&mut out, self.m);
        push_u32_be(&mut out, self.keys.len() as u32);
        for k in &self.keys {
            out.extend_from_slice(&k.0);
        }
        out
    }

    pub fn hash_encoded(&self) -> Hash256 {
        Hash256::compute(&self.encode())
    }

    /// Succeeds when at least `m` of `sigs` each validate under some
    /// distinct key in `keys`. A single key is never counted twice even
    /// if two supplied signatures happen to validate under it.
    pub fn verify(&self, msg: &[u8], sigs: &[Signature]) -> bool {
        let mut satisfied: BTreeSet<Ed25519Pub> = BTreeSet::new();
        for sig in sigs {
            for key in &self.keys {
                if satisfied.contains(key) {
                    continue;
                }
                if key.verify(msg, sig) {
                    satisfied.insert(*key);
                    break;
                }
            }
        }
        satisfied.len() as u32 >= self.m
    }
}
