//! Typed view over a contract box's JSON-shaped `value`.
//!
//! The box model stores a contract's mutable state as JSON (see the
//! DESIGN NOTES on "JSON-valued boxes" in the spec) because box ids are
//! derived from its canonical bytes. `ContractValue` is a thin, fallible
//! typed wrapper over that JSON so the contract engine doesn't have to
//! poke at a raw `serde_json::Value` with string keys everywhere.

use serde_json::{json, Map, Value};

use super::prop::Ed25519Pub;

/// Status domain for `storage.status` (invariant 4 in the spec).
pub const STATUS_INITIALIZED: &str = "initialized";

/// Typed accessor over a `ContractBox.value` JSON object.
///
/// `ContractValue::to_json` / `from_json` are the only places that touch
/// the raw shape; everything else in the contract engine goes through
/// the named accessors here.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractValue {
    pub producer: Ed25519Pub,
    pub hub: Ed25519Pub,
    pub investor: Ed25519Pub,
    pub agreement: Value,
    pub storage: Value,
    pub last_updated: u64,
}

#[derive(Debug)]
pub enum ContractValueError {
    MissingField(&'static str),
    WrongType(&'static str),
    BadBase58(&'static str),
}

impl ContractValue {
    pub fn new(
        producer: Ed25519Pub,
        hub: Ed25519Pub,
        investor: Ed25519Pub,
        agreement: Value,
        last_updated: u64,
    ) -> Self {
        ContractValue {
            producer,
            hub,
            investor,
            agreement,
            storage: json!({ "status": STATUS_INITIALIZED }),
            last_updated,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "producer": self.producer.to_base58(),
            "hub": self.hub.to_base58(),
            "investor": self.investor.to_base58(),
            "agreement": self.agreement,
            "storage": self.storage,
            "lastUpdated": self.last_updated,
        })
    }

    pub fn from_json(v: &Value) -> Result<Self, ContractValueError> {
        let obj = v.as_object().ok_or(ContractValueError::WrongType("root"))?;
        let pk = |field: &'static str| -> Result<Ed25519Pub, ContractValueError> {
            let s = obj
                .get(field)
                .and_then(Value::as_str)
                .ok_or(ContractValueError::MissingField(field))?;
            Ed25519Pub::from_base58(s).map_err(|_| ContractValueError::BadBase58(field))
        };
        let producer = pk("producer")?;
        let hub = pk("hub")?;
        let investor = pk("investor")?;
        let agreement = obj
            .get("agreement")
            .cloned()
            .ok_or(ContractValueError::MissingField("agreement"))?;
        let storage = obj
            .get("storage")
            .cloned()
            .ok_or(ContractValueError::MissingField("storage"))?;
        let last_updated = obj
            .get("lastUpdated")
            .and_then(Value::as_u64)
            .ok_or(ContractValueError::MissingField("lastUpdated"))?;

        Ok(ContractValue {
            producer,
            hub,
            investor,
            agreement,
            storage,
            last_updated,
        })
    }

    /// Returns the public key bound to `role`.
    pub fn party_key(&self, role: super::tx::Role) -> Ed25519Pub {
        match role {
            super::tx::Role::Producer => self.producer,
            super::tx::Role::Hub => self.hub,
            super::tx::Role::Investor => self.investor,
        }
    }

    /// Returns the role a given public key plays in this contract, if any.
    pub fn role_of(&self, pub_key: &Ed25519Pub) -> Option<super::tx::Role> {
        if &self.producer == pub_key {
            Some(super::tx::Role::Producer)
        } else if &self.hub == pub_key {
            Some(super::tx::Role::Hub)
        } else if &self.investor == pub_key {
            Some(super::tx::Role::Investor)
        } else {
            None
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.storage.get("status").and_then(Value::as_str)
    }

    pub fn storage_object_mut(&mut self) -> &mut Map<String, Value> {
        if !self.storage.is_object() {
            self.storage = json!({});
        }
        self.storage.as_object_mut().expect("just ensured object")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_pub(byte: u8) -> Ed25519Pub {
        Ed25519Pub([byte; 32])
    }

    #[test]
    fn json_roundtrip_preserves_fields() {
        let cv = ContractValue::new(
            dummy_pub(1),
            dummy_pub(2),
            dummy_pub(3),
            json!({"pledge": 100}),
            42,
        );
        let v = cv.to_json();
        let back = ContractValue::from_json(&v).expect("parses back");
        assert_eq!(back, cv);
    }

    #[test]
    fn initial_storage_status_is_initialized() {
        let cv = ContractValue::new(dummy_pub(1), dummy_pub(2), dummy_pub(3), json!({}), 0);
        assert_eq!(cv.status(), Some(STATUS_INITIALIZED));
    }

    #[test]
    fn role_of_matches_party_key() {
        let cv = ContractValue::new(dummy_pub(1), dummy_pub(2), dummy_pub(3), json!({}), 0);
        assert_eq!(cv.role_of(&dummy_pub(2)), Some(super::super::tx::Role::Hub));
        assert_eq!(cv.role_of(&dummy_pub(9)), None);
    }
}
