//! Box model and codec (C1).
//!
//! A box is the atomic unit of chain state: an unspent record addressed
//! by the hash of its own canonical bytes. This module defines the four
//! box variants, their canonical byte encoding, and id derivation.

use serde_json::Value;

use super::contract_value::ContractValue;
use super::prop::{Ed25519Pub, MofN};
use super::{h, push_u32_be, push_u64_be, Hash256};
use crate::json_canon::canonical_json_bytes;

pub type BoxId = Hash256;

const TAG_POLY: &str = "PolyBox";
const TAG_ARBIT: &str = "ArbitBox";
const TAG_CONTRACT: &str = "ContractBox";
const TAG_PROFILE: &str = "ProfileBox";

/// Sum of the four box variants. `nonce` and `id` are conceptually part
/// of every variant (see spec §3); here each variant carries its own
/// `nonce` field and `id()` is computed on demand rather than cached,
/// so a box can never be constructed with a stale id.
#[derive(Clone, Debug, PartialEq)]
pub enum Box {
    Poly {
        prop: Ed25519Pub,
        nonce: u64,
        value: u64,
    },
    Arbit {
        prop: Ed25519Pub,
        nonce: u64,
        value: u64,
    },
    Contract {
        prop: MofN,
        nonce: u64,
        value: Value,
    },
    Profile {
        prop: Ed25519Pub,
        value: String,
        field: String,
    },
}

#[derive(Debug)]
pub enum BoxCodecError {
    Truncated,
    UnknownTag(String),
    BadUtf8,
    BadJson,
}

impl Box {
    /// Derives this box's stable id per spec §3 / §4.1.
    pub fn id(&self) -> BoxId {
        match self {
            Box::Poly { prop, nonce, .. } | Box::Arbit { prop, nonce, .. } => {
                let mut buf = Vec::with_capacity(40);
                buf.extend_from_slice(&prop.0);
                push_u64_be(&mut buf, *nonce);
                h(&buf)
            }
            Box::Contract { prop, nonce, value } => {
                let mut buf = prop.encode();
                push_u64_be(&mut buf, *nonce);
                buf.extend_from_slice(&canonical_json_bytes(value));
                h(&buf)
            }
            Box::Profile { prop, field, .. } => {
                let mut buf = Vec::with_capacity(32 + field.len());
                buf.extend_from_slice(&prop.0);
                buf.extend_from_slice(field.as_bytes());
                h(&buf)
            }
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            Box::Poly { nonce, .. } | Box::Arbit { nonce, .. } | Box::Contract { nonce, .. } => {
                *nonce
            }
            Box::Profile { .. } => 0,
        }
    }

    pub fn contract_value(&self) -> Option<Result<ContractValue, super::contract_value::ContractValueError>> {
        match self {
            Box::Contract { value, .. } => Some(ContractValue::from_json(value)),
            _ => None,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Box::Poly { .. } => TAG_POLY,
            Box::Arbit { .. } => TAG_ARBIT,
            Box::Contract { .. } => TAG_CONTRACT,
            Box::Profile { .. } => TAG_PROFILE,
        }
    }

    /// Canonical byte encoding: `u32_be(tag_len) || utf8(tag) || body`.
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.tag();
        let mut out = Vec::new();
        push_u32_be(&mut out, tag.len() as u32);
        out.extend_from_slice(tag.as_bytes());

        match self {
            Box::Poly { prop, nonce, value } | Box::Arbit { prop, nonce, value } => {
                out.extend_from_slice(&prop.0);
                push_u64_be(&mut out, *nonce);
                push_u64_be(&mut out, *value);
            }
            Box::Contract { prop, nonce, value } => {
                out.extend_from_slice(&prop.encode());
                push_u64_be(&mut out, *nonce);
                let json_bytes = canonical_json_bytes(value);
                push_u32_be(&mut out, json_bytes.len() as u32);
                out.extend_from_slice(&json_bytes);
            }
            Box::Profile { prop, value, field } => {
                out.extend_from_slice(&prop.0);
                push_u32_be(&mut out, value.len() as u32);
                out.extend_from_slice(value.as_bytes());
                push_u32_be(&mut out, field.len() as u32);
                out.extend_from_slice(field.as_bytes());
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BoxCodecError> {
        let mut cur = Cursor::new(bytes);
        let tag_len = cur.take_u32()? as usize;
        let tag = cur.take_utf8(tag_len)?;

        match tag.as_str() {
            TAG_POLY | TAG_ARBIT => {
                let mut prop_bytes = [0u8; 32];
                prop_bytes.copy_from_slice(cur.take(32)?);
                let nonce = cur.take_u64()?;
                let value = cur.take_u64()?;
                let prop = Ed25519Pub(prop_bytes);
                Ok(if tag == TAG_POLY {
                    Box::Poly { prop, nonce, value }
                } else {
                    Box::Arbit { prop, nonce, value }
                })
            }
            TAG_CONTRACT => {
                let m = cur.take_u32()?;
                let n = cur.take_u32()? as usize;
                let mut keys = std::collections::BTreeSet::new();
                for _ in 0..n {
                    let mut kb = [0u8; 32];
                    kb.copy_from_slice(cur.take(32)?);
                    keys.insert(Ed25519Pub(kb));
                }
                let prop = MofN { m, keys };
                let nonce = cur.take_u64()?;
                let json_len = cur.take_u32()? as usize;
                let json_bytes = cur.take(json_len)?;
                let value: Value =
                    serde_json::from_slice(json_bytes).map_err(|_| BoxCodecError::BadJson)?;
                Ok(Box::Contract { prop, nonce, value })
            }
            TAG_PROFILE => {
                let mut prop_bytes = [0u8; 32];
                prop_bytes.copy_from_slice(cur.take(32)?);
                let value_len = cur.take_u32()? as usize;
                let value = cur.take_utf8(value_len)?;
                let field_len = cur.take_u32()? as usize;
                let field = cur.take_utf8(field_len)?;
                Ok(Box::Profile {
                    prop: Ed25519Pub(prop_bytes),
                    value,
                    field,
                })
            }
            other => Err(BoxCodecError::UnknownTag(other.to_string())),
        }
    }
}

/// Minimal forward-only cursor over a byte slice, used by [`Box::decode`].
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BoxCodecError> {
        if self.pos + n > self.bytes.len() {
            return Err(BoxCodecError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, BoxCodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_u64(&mut self) -> Result<u64, BoxCodecError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    fn take_utf8(&mut self, n: usize) -> Result<String, BoxCodecError> {
        let b = self.take(n)?;
        String::from_utf8(b.to_vec()).map_err(|_| BoxCodecError::BadUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dummy_pub(byte: u8) -> Ed25519Pub {
        Ed25519Pub([byte; 32])
    }

    #[test]
    fn poly_box_roundtrips() {
        let b = Box::Poly {
            prop: dummy_pub(1),
            nonce: 7,
            value: 1000,
        };
        let bytes = b.encode();
        let decoded = Box::decode(&bytes).expect("decode");
        assert_eq!(decoded, b);
    }

    #[test]
    fn arbit_box_roundtrips() {
        let b = Box::Arbit {
            prop: dummy_pub(2),
            nonce: 0,
            value: 55,
        };
        let bytes = b.encode();
        assert_eq!(Box::decode(&bytes).unwrap(), b);
    }

    #[test]
    fn profile_box_roundtrips_and_nonce_is_zero() {
        let b = Box::Profile {
            prop: dummy_pub(3),
            value: "hub".to_string(),
            field: "role".to_string(),
        };
        let bytes = b.encode();
        let decoded = Box::decode(&bytes).unwrap();
        assert_eq!(decoded, b);
        assert_eq!(decoded.nonce(), 0);
    }

    #[test]
    fn contract_box_roundtrips_with_json_value() {
        let prop = MofN::new(1, [dummy_pub(4), dummy_pub(5)]);
        let value = json!({"status": "initialized", "z": 1, "a": 2});
        let b = Box::Contract {
            prop,
            nonce: 3,
            value,
        };
        let bytes = b.encode();
        assert_eq!(Box::decode(&bytes).unwrap(), b);
    }

    #[test]
    fn poly_and_arbit_ids_depend_only_on_prop_and_nonce() {
        let a = Box::Poly {
            prop: dummy_pub(9),
            nonce: 1,
            value: 100,
        };
        let b = Box::Poly {
            prop: dummy_pub(9),
            nonce: 1,
            value: 999,
        };
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn profile_id_is_independent_of_value() {
        let a = Box::Profile {
            prop: dummy_pub(1),
            value: "hub".to_string(),
            field: "role".to_string(),
        };
        let b = Box::Profile {
            prop: dummy_pub(1),
            value: "investor".to_string(),
            field: "role".to_string(),
        };
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn different_ids_for_different_props() {
        let a = Box::Poly {
            prop: dummy_pub(1),
            nonce: 0,
            value: 1,
        };
        let b = Box::Poly {
            prop: dummy_pub(2),
            nonce: 0,
            value: 1,
        };
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn contract_id_depends_on_json_bytes() {
        let prop = MofN::new(1, [dummy_pub(1)]);
        let a = Box::Contract {
            prop: prop.clone(),
            nonce: 0,
            value: json!({"status": "initialized"}),
        };
        let b = Box::Contract {
            prop,
            nonce: 0,
            value: json!({"status": "complete"}),
        };
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let mut out = Vec::new();
        push_u32_be(&mut out, 4);
        out.extend_from_slice(b"Nope");
        out.extend_from_slice(&[0u8; 8]);
        match Box::decode(&out) {
            Err(BoxCodecError::UnknownTag(t)) => assert_eq!(t, "Nope"),
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        let b = Box::Poly {
            prop: dummy_pub(1),
            nonce: 1,
            value: 1,
        };
        let mut bytes = b.encode();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(Box::decode(&bytes), Err(BoxCodecError::Truncated)));
    }
}
