//! Transaction model and codec (C3).
//!
//! Each transaction kind defines `message_to_sign` (the signed payload)
//! and `semantic_validate` (stateless checks only, no store access).
//! Bit-level stability of `message_to_sign` is load-bearing: signatures
//! will not reverify if the encoding drifts, so every byte here is
//! spelled out explicitly rather than derived through a generic
//! serializer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::boxes::BoxId;
use super::contract_value::ContractValue;
use super::prop::{Ed25519Pub, MofN, Signature};
use super::{h, push_u64_be, Hash256};
use crate::json_canon::canonical_json_bytes;

/// A party role in a three-party supply-chain contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Role {
    Producer,
    Hub,
    Investor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Hub => "hub",
            Role::Investor => "investor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "producer" => Some(Role::Producer),
            "hub" => Some(Role::Hub),
            "investor" => Some(Role::Investor),
            _ => None,
        }
    }
}

/// Stateless validation failure, split by the §7 error taxonomy:
/// malformed shape vs. a violated semantic invariant.
#[derive(Debug)]
pub enum TxValidationError {
    Malformed(String),
    SemanticInvalid(String),
}

impl std::fmt::Display for TxValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxValidationError::Malformed(m) => write!(f, "malformed transaction: {m}"),
            TxValidationError::SemanticInvalid(m) => write!(f, "semantically invalid transaction: {m}"),
        }
    }
}

/// `H(pub || u64_be(nonce))`, the id a `PolyBox`/`ArbitBox` would have.
fn input_id(pub_key: &Ed25519Pub, nonce: u64) -> Hash256 {
    let mut buf = Vec::with_capacity(40);
    buf.extend_from_slice(&pub_key.0);
    push_u64_be(&mut buf, nonce);
    h(&buf)
}

/// Derives `first_8_bytes_as_u64_be(H(...))`, the nonce-derivation idiom
/// used by both `PolyTransfer` and `ContractCreation` output boxes.
fn first8_be_u64(hash: &Hash256) -> u64 {
    super::first_8_bytes_as_u64_be(hash.as_bytes())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolyTransfer {
    pub from: Vec<(Ed25519Pub, u64)>,
    pub to: Vec<(Ed25519Pub, u64)>,
    pub sigs: Vec<Signature>,
    pub fee: u64,
    pub ts: u64,
}

impl PolyTransfer {
    fn input_ids(&self) -> Vec<Hash256> {
        self.from.iter().map(|(pk, n)| input_id(pk, *n)).collect()
    }

    /// `concat(to[*].pub) || concat(id_of(from[*])) || u64_be(ts) || u64_be(fee)`
    pub fn message_to_sign(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (pk, _) in &self.to {
            buf.extend_from_slice(&pk.0);
        }
        for id in self.input_ids() {
            buf.extend_from_slice(id.as_bytes());
        }
        push_u64_be(&mut buf, self.ts);
        push_u64_be(&mut buf, self.fee);
        buf
    }

    pub fn semantic_validate(&self) -> Result<(), TxValidationError> {
        if self.from.len() != self.sigs.len() {
            return Err(TxValidationError::Malformed(format!(
                "expected {} signatures, got {}",
                self.from.len(),
                self.sigs.len()
            )));
        }
        let msg = self.message_to_sign();
        for (i, (pk, _)) in self.from.iter().enumerate() {
            if !pk.verify(&msg, &self.sigs[i]) {
                return Err(TxValidationError::SemanticInvalid(format!(
                    "signature {i} does not validate"
                )));
            }
        }
        Ok(())
    }

    /// `hash_no_nonces = H(concat(to.pub) || concat(input_ids) || u64_be(ts) || u64_be(fee))`
    fn hash_no_nonces(&self) -> Hash256 {
        let mut buf = Vec::new();
        for (pk, _) in &self.to {
            buf.extend_from_slice(&pk.0);
        }
        for id in self.input_ids() {
            buf.extend_from_slice(id.as_bytes());
        }
        push_u64_be(&mut buf, self.ts);
        push_u64_be(&mut buf, self.fee);
        h(&buf)
    }

    /// Derives `(prop, nonce, value)` triples for the new `PolyBox`
    /// outputs of this transfer, in recipient order.
    pub fn output_boxes(&self) -> Vec<(Ed25519Pub, u64, u64)> {
        let hash_no_nonces = self.hash_no_nonces();
        self.to
            .iter()
            .enumerate()
            .map(|(i, (pk, value))| {
                let mut buf = Vec::with_capacity(32 + 32 + 4);
                buf.extend_from_slice(&pk.0);
                buf.extend_from_slice(hash_no_nonces.as_bytes());
                super::push_u32_be(&mut buf, i as u32);
                let nonce = first8_be_u64(&h(&buf));
                (*pk, nonce, *value)
            })
            .collect()
    }

    pub fn input_box_ids(&self) -> Vec<BoxId> {
        self.input_ids()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractCreation {
    pub agreement: Value,
    pub parties: [(Role, Ed25519Pub); 3],
    pub sigs: [Signature; 3],
    pub fee: u64,
    pub ts: u64,
}

/// Checks the static terms of a contract (pledge, exchange rate,
/// share/fulfilment curves, expiration). Only `expirationTimestamp` is
/// load-bearing for `checkExpiration`; the rest is carried opaquely.
pub fn validate_agreement(agreement: &Value) -> Result<(), TxValidationError> {
    let obj = agreement
        .as_object()
        .ok_or_else(|| TxValidationError::Malformed("agreement is not a JSON object".into()))?;
    match obj.get("expirationTimestamp").and_then(Value::as_u64) {
        Some(_) => Ok(()),
        None => Err(TxValidationError::Malformed(
            "agreement missing numeric expirationTimestamp".into(),
        )),
    }
}

impl ContractCreation {
    /// `u64_be(ts) || encode(agreement) || concat(parties[*].pub)`
    pub fn message_to_sign(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u64_be(&mut buf, self.ts);
        buf.extend_from_slice(&canonical_json_bytes(&self.agreement));
        for (_, pk) in &self.parties {
            buf.extend_from_slice(&pk.0);
        }
        buf
    }

    pub fn semantic_validate(&self) -> Result<(), TxValidationError> {
        let roles: Vec<Role> = self.parties.iter().map(|(r, _)| *r).collect();
        let mut sorted = roles.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != 3
            || !roles.contains(&Role::Producer)
            || !roles.contains(&Role::Hub)
            || !roles.contains(&Role::Investor)
        {
            return Err(TxValidationError::Malformed(
                "parties must cover exactly {producer, hub, investor}".into(),
            ));
        }

        let msg = self.message_to_sign();
        for (i, (_, pk)) in self.parties.iter().enumerate() {
            if !pk.verify(&msg, &self.sigs[i]) {
                return Err(TxValidationError::SemanticInvalid(format!(
                    "signature {i} does not validate"
                )));
            }
        }

        validate_agreement(&self.agreement)?;
        Ok(())
    }

    fn hash_no_nonces(&self) -> Hash256 {
        let mut buf = Vec::new();
        buf.extend_from_slice(&canonical_json_bytes(&self.agreement));
        for (_, pk) in &self.parties {
            buf.extend_from_slice(&pk.0);
        }
        push_u64_be(&mut buf, self.ts);
        push_u64_be(&mut buf, self.fee);
        h(&buf)
    }

    pub fn proposition(&self) -> MofN {
        MofN::new(1, self.parties.iter().map(|(_, pk)| *pk))
    }

    /// Role -> key lookup, independent of array position.
    pub fn party(&self, role: Role) -> Ed25519Pub {
        self.parties
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, pk)| *pk)
            .expect("semantic_validate guarantees all three roles are present")
    }

    /// Derives `(prop, nonce, value)` for the new `ContractBox`.
    pub fn output_box(&self) -> (MofN, u64, Value) {
        let prop = self.proposition();
        let mut buf = prop.encode();
        buf.extend_from_slice(self.hash_no_nonces().as_bytes());
        let nonce = first8_be_u64(&h(&buf));

        let contract_value = ContractValue::new(
            self.party(Role::Producer),
            self.party(Role::Hub),
            self.party(Role::Investor),
            self.agreement.clone(),
            self.ts,
        );

        (prop, nonce, contract_value.to_json())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractMethodExecution {
    /// The full contract box as currently held in state. The engine
    /// resolves this against the store to confirm it still matches
    /// (§4.6); it is carried on the transaction so stateless validation
    /// can check `sigs[0]` against the embedded proposition.
    pub contract_prop: MofN,
    pub contract_box_id: BoxId,
    pub party: (Role, Ed25519Pub),
    pub method: String,
    pub params: Value,
    pub sigs: [Signature; 2],
    pub fee: u64,
    pub ts: u64,
}

impl ContractMethodExecution {
    /// `u64_be(ts)` only.
    pub fn message_to_sign(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u64_be(&mut buf, self.ts);
        buf
    }

    pub fn semantic_validate(&self) -> Result<(), TxValidationError> {
        if crate::contract::Method::from_name(&self.method).is_none() {
            return Err(TxValidationError::SemanticInvalid(format!(
                "unknown contract method: {}",
                self.method
            )));
        }

        let msg = self.message_to_sign();

        if !self.contract_prop.verify(&msg, &self.sigs[0..1]) {
            return Err(TxValidationError::SemanticInvalid(
                "sigs[0] does not satisfy the contract's proposition".into(),
            ));
        }
        let (_, caller_pub) = &self.party;
        if !caller_pub.verify(&msg, &self.sigs[1]) {
            return Err(TxValidationError::SemanticInvalid(
                "sigs[1] does not validate under the caller's key".into(),
            ));
        }
        Ok(())
    }

    /// Derives the nonce for the contract box produced by a successful
    /// method call, using the same "hash the call's fingerprint" idiom
    /// as `PolyTransfer`/`ContractCreation` outputs (§4.3): the contract
    /// keeps the same proposition (same three parties), but bumps to a
    /// fresh nonce so its id changes whenever `storage` changes.
    ///
    /// The spec does not spell out this derivation for method calls the
    /// way it does for the other two transaction kinds; this follows the
    /// established pattern (`first_8_bytes_as_u64_be(H(encode(prop) ||
    /// hash_no_nonces))`) rather than inventing an unrelated scheme.
    pub fn output_nonce(&self) -> u64 {
        let mut fingerprint = Vec::new();
        fingerprint.extend_from_slice(self.contract_box_id.as_bytes());
        fingerprint.extend_from_slice(self.method.as_bytes());
        fingerprint.extend_from_slice(&canonical_json_bytes(&self.params));
        push_u64_be(&mut fingerprint, self.ts);
        push_u64_be(&mut fingerprint, self.fee);
        let hash_no_nonces = h(&fingerprint);

        let mut buf = self.contract_prop.encode();
        buf.extend_from_slice(hash_no_nonces.as_bytes());
        first8_be_u64(&h(&buf))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileTransaction {
    pub from: Ed25519Pub,
    pub sig: Signature,
    pub kv: BTreeMap<String, String>,
    pub fee: u64,
    pub ts: u64,
}

impl ProfileTransaction {
    /// `u64_be(ts) || from.pub || utf8(canonical_json(kv))`
    pub fn message_to_sign(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u64_be(&mut buf, self.ts);
        buf.extend_from_slice(&self.from.0);
        let kv_json: Value = serde_json::to_value(&self.kv).expect("BTreeMap<String,String> serializes");
        buf.extend_from_slice(&canonical_json_bytes(&kv_json));
        buf
    }

    pub fn semantic_validate(&self) -> Result<(), TxValidationError> {
        for key in self.kv.keys() {
            if key != "role" {
                return Err(TxValidationError::Malformed(format!(
                    "unknown profile key: {key}"
                )));
            }
        }
        if let Some(role) = self.kv.get("role") {
            if Role::from_str(role).is_none() {
                return Err(TxValidationError::Malformed(format!(
                    "unknown role value: {role}"
                )));
            }
        }
        let msg = self.message_to_sign();
        if !self.from.verify(&msg, &self.sig) {
            return Err(TxValidationError::SemanticInvalid(
                "signature does not validate".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Transaction {
    PolyTransfer(PolyTransfer),
    ContractCreation(ContractCreation),
    ContractMethodExecution(ContractMethodExecution),
    ProfileTransaction(ProfileTransaction),
}

impl Transaction {
    pub fn fee(&self) -> u64 {
        match self {
            Transaction::PolyTransfer(tx) => tx.fee,
            Transaction::ContractCreation(tx) => tx.fee,
            Transaction::ContractMethodExecution(tx) => tx.fee,
            Transaction::ProfileTransaction(tx) => tx.fee,
        }
    }

    pub fn ts(&self) -> u64 {
        match self {
            Transaction::PolyTransfer(tx) => tx.ts,
            Transaction::ContractCreation(tx) => tx.ts,
            Transaction::ContractMethodExecution(tx) => tx.ts,
            Transaction::ProfileTransaction(tx) => tx.ts,
        }
    }

    /// Stateless checks only, usable for mempool admission.
    pub fn semantic_validate(&self) -> Result<(), TxValidationError> {
        match self {
            Transaction::PolyTransfer(tx) => tx.semantic_validate(),
            Transaction::ContractCreation(tx) => tx.semantic_validate(),
            Transaction::ContractMethodExecution(tx) => tx.semantic_validate(),
            Transaction::ProfileTransaction(tx) => tx.semantic_validate(),
        }
    }

    /// Canonical bytes for on-disk/log storage of a transaction. Not the
    /// signed payload (see `message_to_sign` on each variant), just a
    /// stable internal encoding for the store's log.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg).expect("Transaction always encodes with bincode 2")
    }

    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, TxValidationError> {
        let cfg = bincode::config::standard();
        let (tx, _): (Transaction, usize) = bincode::serde::decode_from_slice(bytes, cfg)
            .map_err(|e| TxValidationError::Malformed(format!("bincode decode failed: {e}")))?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;
    use serde_json::json;

    fn gen_keypair() -> (SigningKey, Ed25519Pub) {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = Ed25519Pub(sk.verifying_key().to_bytes());
        (sk, pk)
    }

    #[test]
    fn poly_transfer_roundtrips_with_bincode2() {
        let (sk, pk_from) = gen_keypair();
        let (_sk2, pk_to) = gen_keypair();

        let mut tx = PolyTransfer {
            from: vec![(pk_from, 1)],
            to: vec![(pk_to, 890)],
            sigs: vec![],
            fee: 10,
            ts: 1_700_000_000,
        };
        let msg = tx.message_to_sign();
        tx.sigs = vec![Signature(sk.sign(&msg).to_bytes().to_vec())];

        let wrapped = Transaction::PolyTransfer(tx);
        let bytes = wrapped.canonical_bytes();
        let decoded = Transaction::from_canonical_bytes(&bytes).expect("decode");
        match decoded {
            Transaction::PolyTransfer(t) => {
                assert_eq!(t.fee, 10);
                assert_eq!(t.ts, 1_700_000_000);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn poly_transfer_semantic_validate_requires_matching_sig_count() {
        let (_sk, pk_from) = gen_keypair();
        let (_sk2, pk_to) = gen_keypair();
        let tx = PolyTransfer {
            from: vec![(pk_from, 1)],
            to: vec![(pk_to, 890)],
            sigs: vec![],
            fee: 10,
            ts: 1,
        };
        assert!(matches!(
            tx.semantic_validate(),
            Err(TxValidationError::Malformed(_))
        ));
    }

    #[test]
    fn poly_transfer_flipped_signature_bit_fails_semantic_validate() {
        let (sk, pk_from) = gen_keypair();
        let (_sk2, pk_to) = gen_keypair();
        let mut tx = PolyTransfer {
            from: vec![(pk_from, 1)],
            to: vec![(pk_to, 890)],
            sigs: vec![],
            fee: 10,
            ts: 1,
        };
        let msg = tx.message_to_sign();
        let mut raw = sk.sign(&msg).to_bytes().to_vec();
        raw[0] ^= 0x01;
        tx.sigs = vec![Signature(raw)];

        assert!(matches!(
            tx.semantic_validate(),
            Err(TxValidationError::SemanticInvalid(_))
        ));
    }

    #[test]
    fn output_boxes_nonce_is_deterministic() {
        let (_sk, pk_from) = gen_keypair();
        let (_sk2, pk_to) = gen_keypair();
        let tx = PolyTransfer {
            from: vec![(pk_from, 1)],
            to: vec![(pk_to, 890)],
            sigs: vec![],
            fee: 10,
            ts: 1,
        };
        let a = tx.output_boxes();
        let b = tx.output_boxes();
        assert_eq!(a, b);
    }

    #[test]
    fn profile_tx_rejects_unknown_key() {
        let (sk, pk) = gen_keypair();
        let mut kv = BTreeMap::new();
        kv.insert("nickname".to_string(), "bob".to_string());
        let mut tx = ProfileTransaction {
            from: pk,
            sig: Signature(vec![]),
            kv,
            fee: 0,
            ts: 1,
        };
        let msg = tx.message_to_sign();
        tx.sig = Signature(sk.sign(&msg).to_bytes().to_vec());
        assert!(matches!(
            tx.semantic_validate(),
            Err(TxValidationError::Malformed(_))
        ));
    }

    #[test]
    fn profile_tx_rejects_unknown_role_value() {
        let (sk, pk) = gen_keypair();
        let mut kv = BTreeMap::new();
        kv.insert("role".to_string(), "king".to_string());
        let mut tx = ProfileTransaction {
            from: pk,
            sig: Signature(vec![]),
            kv,
            fee: 0,
            ts: 1,
        };
        let msg = tx.message_to_sign();
        tx.sig = Signature(sk.sign(&msg).to_bytes().to_vec());
        assert!(matches!(
            tx.semantic_validate(),
            Err(TxValidationError::Malformed(_))
        ));
    }

    #[test]
    fn profile_tx_accepts_known_role_with_valid_signature() {
        let (sk, pk) = gen_keypair();
        let mut kv = BTreeMap::new();
        kv.insert("role".to_string(), "hub".to_string());
        let mut tx = ProfileTransaction {
            from: pk,
            sig: Signature(vec![]),
            kv,
            fee: 0,
            ts: 1,
        };
        let msg = tx.message_to_sign();
        tx.sig = Signature(sk.sign(&msg).to_bytes().to_vec());
        assert!(tx.semantic_validate().is_ok());
    }

    #[test]
    fn contract_creation_requires_all_three_roles() {
        let (sk1, pk1) = gen_keypair();
        let (sk2, pk2) = gen_keypair();
        let (sk3, pk3) = gen_keypair();

        let agreement = json!({"expirationTimestamp": 2_000_000_000u64});
        let mut tx = ContractCreation {
            agreement,
            parties: [(Role::Producer, pk1), (Role::Hub, pk2), (Role::Hub, pk3)],
            sigs: [Signature(vec![]), Signature(vec![]), Signature(vec![])],
            fee: 0,
            ts: 1,
        };
        let msg = tx.message_to_sign();
        tx.sigs = [
            Signature(sk1.sign(&msg).to_bytes().to_vec()),
            Signature(sk2.sign(&msg).to_bytes().to_vec()),
            Signature(sk3.sign(&msg).to_bytes().to_vec()),
        ];
        assert!(matches!(
            tx.semantic_validate(),
            Err(TxValidationError::Malformed(_))
        ));
    }

    #[test]
    fn contract_creation_happy_path_validates() {
        let (sk1, pk1) = gen_keypair();
        let (sk2, pk2) = gen_keypair();
        let (sk3, pk3) = gen_keypair();

        let agreement = json!({"expirationTimestamp": 2_000_000_000u64, "pledge": 100});
        let mut tx = ContractCreation {
            agreement,
            parties: [
                (Role::Producer, pk1),
                (Role::Hub, pk2),
                (Role::Investor, pk3),
            ],
            sigs: [Signature(vec![]), Signature(vec![]), Signature(vec![])],
            fee: 0,
            ts: 1,
        };
        let msg = tx.message_to_sign();
        tx.sigs = [
            Signature(sk1.sign(&msg).to_bytes().to_vec()),
            Signature(sk2.sign(&msg).to_bytes().to_vec()),
            Signature(sk3.sign(&msg).to_bytes().to_vec()),
        ];
        assert!(tx.semantic_validate().is_ok());

        let (_, _nonce, value) = tx.output_box();
        let cv = ContractValue::from_json(&value).expect("parses");
        assert_eq!(cv.status(), Some("initialized"));
    }

    #[test]
    fn method_execution_rejects_unknown_method_name() {
        let (sk_contract, pk_contract) = gen_keypair();
        let (sk_caller, pk_caller) = gen_keypair();
        let mut tx = ContractMethodExecution {
            contract_prop: MofN::new(1, [pk_contract]),
            contract_box_id: Hash256([0; 32]),
            party: (Role::Producer, pk_caller),
            method: "selfDestruct".to_string(),
            params: json!({}),
            sigs: [Signature(vec![]), Signature(vec![])],
            fee: 0,
            ts: 1,
        };
        let msg = tx.message_to_sign();
        tx.sigs = [
            Signature(sk_contract.sign(&msg).to_bytes().to_vec()),
            Signature(sk_caller.sign(&msg).to_bytes().to_vec()),
        ];
        assert!(matches!(
            tx.semantic_validate(),
            Err(TxValidationError::SemanticInvalid(_))
        ));
    }
}
