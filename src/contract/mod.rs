//! Contract engine (C4).
//!
//! A contract object is `(producer, hub, investor, storage, agreement,
//! id)`, exposed through a fixed dispatch table keyed by method name.
//! There is no reflective lookup: `Method` is a closed enum, and adding a
//! callable method means adding a variant here, not exposing a new public
//! function on some trait object. This keeps the contract's attack
//! surface exactly as wide as this file says it is.
//!
//! `deliver`'s delivery timestamp and `checkExpiration`'s comparison both
//! use the committing block's timestamp rather than the wall clock, so
//! that applying the same block on two replicas produces byte-identical
//! contract storage (see the timestamp-determinism note this module is
//! grounded on).

use serde_json::{json, Value};

use crate::types::{ContractValue, Role};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Complete,
    CurrentStatus,
    Deliver,
    ConfirmDelivery,
    CheckExpiration,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "complete" => Some(Method::Complete),
            "currentStatus" => Some(Method::CurrentStatus),
            "deliver" => Some(Method::Deliver),
            "confirmDelivery" => Some(Method::ConfirmDelivery),
            "checkExpiration" => Some(Method::CheckExpiration),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ContractError {
    UnknownMethod(String),
    WrongCaller { expected: Role, actual: Role },
    BadParams(String),
    BadStatus(String),
    UnknownDeliveryId(String),
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractError::UnknownMethod(m) => write!(f, "unknown contract method: {m}"),
            ContractError::WrongCaller { expected, actual } => write!(
                f,
                "caller has role {actual:?}, method requires {expected:?}"
            ),
            ContractError::BadParams(m) => write!(f, "bad method params: {m}"),
            ContractError::BadStatus(m) => write!(f, "contract in wrong status: {m}"),
            ContractError::UnknownDeliveryId(id) => write!(f, "unknown delivery id: {id}"),
        }
    }
}

impl std::error::Error for ContractError {}

/// Outcome of a dispatched method call: either the contract's `storage`
/// changed (the caller replaces the contract box with a bumped nonce),
/// or the call was a pure query and the contract box is untouched.
pub enum MethodOutcome {
    Updated(ContractValue),
    Query(Value),
}

/// Dispatches `method` against `contract` on behalf of `caller_role`,
/// using `block_ts` wherever the method would otherwise consult a clock.
pub fn dispatch(
    method_name: &str,
    caller_role: Role,
    contract: &ContractValue,
    params: &Value,
    block_ts: u64,
) -> Result<MethodOutcome, ContractError> {
    let method =
        Method::from_name(method_name).ok_or_else(|| ContractError::UnknownMethod(method_name.to_string()))?;

    match method {
        Method::Complete => complete(contract),
        Method::CurrentStatus => current_status(contract),
        Method::Deliver => deliver(caller_role, contract, params, block_ts),
        Method::ConfirmDelivery => confirm_delivery(caller_role, contract, params, block_ts),
        Method::CheckExpiration => check_expiration(contract, block_ts),
    }
}

fn complete(contract: &ContractValue) -> Result<MethodOutcome, ContractError> {
    Ok(MethodOutcome::Updated(contract.clone()))
}

fn current_status(contract: &ContractValue) -> Result<MethodOutcome, ContractError> {
    let status = contract.status().unwrap_or("initialized");
    Ok(MethodOutcome::Query(Value::String(status.to_string())))
}

fn require_role(caller_role: Role, expected: Role) -> Result<(), ContractError> {
    if caller_role != expected {
        return Err(ContractError::WrongCaller {
            expected,
            actual: caller_role,
        });
    }
    Ok(())
}

fn pending_deliveries(contract: &ContractValue) -> Vec<Value> {
    contract
        .storage
        .get("currentFulfillment")
        .and_then(|cf| cf.get("pendingDeliveries"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn deliver(
    caller_role: Role,
    contract: &ContractValue,
    params: &Value,
    block_ts: u64,
) -> Result<MethodOutcome, ContractError> {
    require_role(caller_role, Role::Producer)?;

    let quantity = params
        .get("quantity")
        .and_then(Value::as_u64)
        .ok_or_else(|| ContractError::BadParams("missing numeric quantity".into()))?;
    if quantity == 0 {
        return Err(ContractError::BadParams("quantity must be > 0".into()));
    }

    let status = contract.status().unwrap_or("initialized");
    if status == "expired" || status == "complete" {
        return Err(ContractError::BadStatus(format!(
            "cannot deliver while status is {status}"
        )));
    }

    let mut pending = pending_deliveries(contract);
    let provisional_entry = json!({ "quantity": quantity, "timestamp": block_ts });
    let mut fingerprint_input = pending.clone();
    fingerprint_input.push(provisional_entry);
    let id = bs58::encode(crate::types::h(&crate::json_canon::canonical_json_bytes(&Value::Array(
        fingerprint_input,
    ))).as_bytes())
    .into_string();

    let entry = json!({ "id": id, "quantity": quantity, "timestamp": block_ts });
    pending.push(entry);

    let mut updated = contract.clone();
    {
        let storage = updated.storage_object_mut();
        let cf = storage
            .entry("currentFulfillment")
            .or_insert_with(|| json!({}));
        if !cf.is_object() {
            *cf = json!({});
        }
        cf.as_object_mut()
            .expect("just ensured object")
            .insert("pendingDeliveries".to_string(), Value::Array(pending));
    }
    updated.last_updated = block_ts;
    Ok(MethodOutcome::Updated(updated))
}

fn confirm_delivery(
    caller_role: Role,
    contract: &ContractValue,
    params: &Value,
    block_ts: u64,
) -> Result<MethodOutcome, ContractError> {
    require_role(caller_role, Role::Hub)?;

    let delivery_id = params
        .get("deliveryId")
        .and_then(Value::as_str)
        .ok_or_else(|| ContractError::BadParams("missing string deliveryId".into()))?;

    let mut pending = pending_deliveries(contract);
    let idx = pending
        .iter()
        .position(|e| e.get("id").and_then(Value::as_str) == Some(delivery_id))
        .ok_or_else(|| ContractError::UnknownDeliveryId(delivery_id.to_string()))?;
    let entry = pending.remove(idx);
    let quantity = entry.get("quantity").and_then(Value::as_u64).unwrap_or(0);

    let delivered_so_far = contract
        .storage
        .get("currentFulfillment")
        .and_then(|cf| cf.get("deliveredQuantity"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let mut updated = contract.clone();
    {
        let storage = updated.storage_object_mut();
        let cf = storage
            .entry("currentFulfillment")
            .or_insert_with(|| json!({}));
        if !cf.is_object() {
            *cf = json!({});
        }
        let cf_obj = cf.as_object_mut().expect("just ensured object");
        cf_obj.insert("pendingDeliveries".to_string(), Value::Array(pending));
        cf_obj.insert(
            "deliveredQuantity".to_string(),
            Value::from(delivered_so_far + quantity),
        );
    }
    updated.last_updated = block_ts;
    Ok(MethodOutcome::Updated(updated))
}

fn check_expiration(contract: &ContractValue, block_ts: u64) -> Result<MethodOutcome, ContractError> {
    let expiration = contract
        .agreement
        .get("expirationTimestamp")
        .and_then(Value::as_u64)
        .ok_or_else(|| ContractError::BadParams("agreement missing expirationTimestamp".into()))?;
    Ok(MethodOutcome::Query(Value::Bool(block_ts > expiration)))
}
