//! State transition engine (C6).
//!
//! Ties together the box codec (C1), propositions (C2), transaction
//! semantics (C3), the contract dispatch table (C4), and the versioned
//! store (C5) into the single authority that decides whether a block is
//! admissible and, if so, applies it atomically.
//!
//! Per the spec's concurrency model this type is single-writer: one
//! thread of control drives `validate -> changes -> apply` for a given
//! block through [`Engine::apply_block`]. Readers may call
//! [`Engine::closed_box`] concurrently against the committed snapshot
//! through their own handle on the same store, since `BoxStore::get`
//! only needs `&self`.

use std::collections::HashSet;
use std::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::contract::{self, MethodOutcome};
use crate::error::EngineError;
use crate::metrics::MetricsRegistry;
use crate::store::{BoxStore, RocksDbBoxStore, StoreDelta, StoreError};
use crate::types::boxes::Box as BoxRecord;
use crate::types::contract_value::ContractValue;
use crate::types::tx::{
    ContractCreation, ContractMethodExecution, PolyTransfer, ProfileTransaction, Role, Transaction,
};
use crate::types::{Block, BoxId, Hash256};

/// One transaction's worth of state mutation: boxes it spends and boxes
/// it creates. Unioned across a block's transactions to derive the
/// block-level `(remove, append)` delta (§4.6).
struct TxDelta {
    removed: Vec<BoxId>,
    appended: Vec<BoxRecord>,
}

impl TxDelta {
    fn empty() -> Self {
        TxDelta {
            removed: Vec::new(),
            appended: Vec::new(),
        }
    }
}

/// Derives the fixed id of the `ProfileBox` holding `pub_key`'s value
/// for `field`. Profile ids are independent of `value` (spec §3), so an
/// empty placeholder value is fine for the lookup key.
fn profile_box_id(pub_key: &crate::types::Ed25519Pub, field: &str) -> BoxId {
    BoxRecord::Profile {
        prop: *pub_key,
        value: String::new(),
        field: field.to_string(),
    }
    .id()
}

/// Fetches the role registered for `pub_key`, if any `ProfileBox(pub_key,
/// "role")` exists.
fn registered_role<S: BoxStore>(store: &S, pub_key: &crate::types::Ed25519Pub) -> Option<Role> {
    let id = profile_box_id(pub_key, "role");
    match store.get(&id)? {
        BoxRecord::Profile { value, .. } => Role::from_str(&value),
        _ => None,
    }
}

/// The state transition engine: validates transactions against a
/// versioned box store and applies accepted blocks atomically.
pub struct Engine<S: BoxStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
    metrics: Option<MetricsRegistry>,
}

impl<S: BoxStore> Engine<S, SystemClock> {
    /// Builds an engine over `store` using the real wall clock and a
    /// fresh metrics registry.
    pub fn new(store: S) -> Self {
        Engine {
            store,
            clock: SystemClock,
            metrics: MetricsRegistry::new().ok(),
        }
    }
}

impl Engine<RocksDbBoxStore, SystemClock> {
    /// Builds the "typical node" stack described by [`crate::DefaultEngine`]
    /// from an [`EngineConfig`]: opens the RocksDB-backed store at
    /// `cfg.store.rocksdb.path`, and only stands up a metrics registry when
    /// `cfg.metrics.enabled` is set.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self, StoreError> {
        let store = RocksDbBoxStore::open(&cfg.store.rocksdb)?;
        let metrics = if cfg.metrics.enabled {
            MetricsRegistry::new().ok()
        } else {
            None
        };
        Ok(Engine {
            store,
            clock: SystemClock,
            metrics,
        })
    }
}

impl<S: BoxStore, C: Clock> Engine<S, C> {
    /// Builds an engine with an explicit clock (for deterministic tests)
    /// and an optional metrics registry.
    pub fn with_clock(store: S, clock: C, metrics: Option<MetricsRegistry>) -> Self {
        Engine {
            store,
            clock,
            metrics,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> Option<&MetricsRegistry> {
        self.metrics.as_ref()
    }

    /// Point read against the latest committed snapshot.
    pub fn closed_box(&self, id: &BoxId) -> Option<BoxRecord> {
        self.store.get(id)
    }

    pub fn last_version_id(&self) -> Option<Hash256> {
        self.store.last_version_id()
    }

    /// Unwinds the store back to exactly the state immediately after
    /// `version` was committed.
    pub fn rollback_to(&mut self, version: &Hash256) -> Result<(), EngineError> {
        self.store.rollback_to(version)?;
        if let Some(m) = &self.metrics {
            m.engine.rollbacks_total.inc();
        }
        Ok(())
    }

    /// Stateless check only, usable for mempool admission before a box
    /// store handle is even available.
    pub fn semantic_validity(&self, tx: &Transaction) -> Result<(), EngineError> {
        tx.semantic_validate().map_err(EngineError::from)
    }

    /// Full stateful check against the current store, without applying
    /// any mutation.
    pub fn validate(&self, tx: &Transaction) -> Result<(), EngineError> {
        self.semantic_validity(tx)?;
        let prev_ts = self.store.last_timestamp().unwrap_or(0);
        self.check_tx_delta(tx, prev_ts).map(|_| ())
    }

    /// Validates and applies a whole block atomically: either every
    /// transaction is accepted and committed as one new store version,
    /// or the block is rejected and the store is left untouched.
    pub fn apply_block(&mut self, block: &Block) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.apply_block_inner(block);

        if let Some(m) = &self.metrics {
            m.engine
                .block_apply_seconds
                .observe(started.elapsed().as_secs_f64());
            match &result {
                Ok(()) => {
                    m.engine.blocks_applied_total.inc();
                    m.engine.txs_applied_total.inc_by(block.transactions.len() as u64);
                }
                Err(_) => m.engine.blocks_rejected_total.inc(),
            }
        }

        match &result {
            Ok(()) => tracing::debug!(
                block_id = ?block.id,
                tx_count = block.transactions.len(),
                "block applied"
            ),
            Err(e) => tracing::warn!(block_id = ?block.id, error = %e, "block rejected"),
        }

        result
    }

    fn apply_block_inner(&mut self, block: &Block) -> Result<(), EngineError> {
        let prev_ts = self.store.last_timestamp().unwrap_or(0);
        let now = self.clock.now_unix_ms();
        if prev_ts >= now {
            return Err(EngineError::StateInvalid(format!(
                "store's committed timestamp {prev_ts} is not behind wall clock {now}"
            )));
        }
        if block.timestamp <= prev_ts {
            return Err(EngineError::StateInvalid(format!(
                "block timestamp {} does not exceed state timestamp {prev_ts}",
                block.timestamp
            )));
        }

        for tx in &block.transactions {
            self.semantic_validity(tx)?;
        }

        let mut removed_seen: HashSet<BoxId> = HashSet::new();
        let mut appended_seen: HashSet<BoxId> = HashSet::new();
        let mut all_removed = Vec::new();
        let mut all_appended = Vec::new();

        for tx in &block.transactions {
            let delta = self.check_tx_delta(tx, prev_ts)?;

            for id in &delta.removed {
                if !removed_seen.insert(*id) {
                    return Err(EngineError::StateInvalid(format!(
                        "box {id:?} spent twice within the same block"
                    )));
                }
            }
            for b in &delta.appended {
                let id = b.id();
                if !appended_seen.insert(id) {
                    return Err(EngineError::StateInvalid(format!(
                        "box id {id:?} produced twice within the same block"
                    )));
                }
                if removed_seen.contains(&id) {
                    return Err(EngineError::StateInvalid(format!(
                        "box id {id:?} re-creates a box removed earlier in the same block"
                    )));
                }
                if self.store.get(&id).is_some() {
                    return Err(EngineError::StateInvalid(format!(
                        "box id {id:?} collides with a surviving box"
                    )));
                }
            }

            all_removed.extend(delta.removed);
            all_appended.extend(delta.appended);
        }

        self.store.commit(StoreDelta {
            version: block.id,
            timestamp: block.timestamp,
            removed: all_removed,
            appended: all_appended,
        })?;
        Ok(())
    }

    /// Stateful validation plus delta derivation for one transaction,
    /// per the per-kind rules in §4.6. Runs entirely against the
    /// pre-block snapshot; it never mutates the store.
    fn check_tx_delta(&self, tx: &Transaction, prev_ts: u64) -> Result<TxDelta, EngineError> {
        if tx.ts() <= prev_ts {
            return Err(EngineError::StateInvalid(format!(
                "tx timestamp {} does not exceed state timestamp {prev_ts}",
                tx.ts()
            )));
        }

        match tx {
            Transaction::PolyTransfer(t) => self.check_poly_transfer(t),
            Transaction::ContractCreation(t) => self.check_contract_creation(t),
            Transaction::ContractMethodExecution(t) => self.check_contract_method_execution(t),
            Transaction::ProfileTransaction(t) => self.check_profile_transaction(t),
        }
    }

    fn check_poly_transfer(&self, tx: &PolyTransfer) -> Result<TxDelta, EngineError> {
        let input_ids = tx.input_box_ids();
        let mut input_sum: u128 = 0;
        let mut removed = Vec::with_capacity(input_ids.len());

        for id in &input_ids {
            let boxed = self
                .store
                .get(id)
                .ok_or_else(|| EngineError::StateInvalid(format!("unknown input box {id:?}")))?;
            match boxed {
                BoxRecord::Poly { value, .. } => {
                    input_sum += value as u128;
                    removed.push(*id);
                }
                _ => {
                    return Err(EngineError::StateInvalid(format!(
                        "input box {id:?} is not a PolyBox"
                    )))
                }
            }
        }

        let output_sum: u128 = tx.to.iter().map(|(_, v)| *v as u128).sum();
        if input_sum != output_sum + tx.fee as u128 {
            return Err(EngineError::StateInvalid(format!(
                "conservation violated: inputs={input_sum} outputs={output_sum} fee={}",
                tx.fee
            )));
        }

        let appended = tx
            .output_boxes()
            .into_iter()
            .map(|(prop, nonce, value)| BoxRecord::Poly { prop, nonce, value })
            .collect();

        Ok(TxDelta { removed, appended })
    }

    fn check_contract_creation(&self, tx: &ContractCreation) -> Result<TxDelta, EngineError> {
        let mut roles: Vec<Role> = tx.parties.iter().map(|(r, _)| *r).collect();
        roles.sort();
        roles.dedup();
        if roles.len() != 3 {
            return Err(EngineError::StateInvalid(
                "parties do not cover three distinct roles".into(),
            ));
        }

        for (role, pub_key) in &tx.parties {
            let registered = registered_role(&self.store, pub_key).ok_or_else(|| {
                EngineError::StateInvalid(format!("party {pub_key:?} has no registered role"))
            })?;
            if registered != *role {
                return Err(EngineError::StateInvalid(format!(
                    "party {pub_key:?} claims role {role:?} but is registered as {registered:?}"
                )));
            }
        }

        let (prop, nonce, value) = tx.output_box();
        let contract_box = BoxRecord::Contract { prop, nonce, value };
        let id = contract_box.id();
        if self.store.get(&id).is_some() {
            return Err(EngineError::StateInvalid(format!(
                "contract box {id:?} already exists"
            )));
        }

        Ok(TxDelta {
            removed: Vec::new(),
            appended: vec![contract_box],
        })
    }

    fn check_contract_method_execution(
        &self,
        tx: &ContractMethodExecution,
    ) -> Result<TxDelta, EngineError> {
        let existing = self.store.get(&tx.contract_box_id).ok_or_else(|| {
            EngineError::StateInvalid(format!(
                "unknown contract box {:?}",
                tx.contract_box_id
            ))
        })?;

        let (box_prop, box_value) = match existing {
            BoxRecord::Contract { prop, value, .. } => (prop, value),
            _ => {
                return Err(EngineError::StateInvalid(format!(
                    "box {:?} is not a ContractBox",
                    tx.contract_box_id
                )))
            }
        };
        if box_prop != tx.contract_prop {
            return Err(EngineError::StateInvalid(
                "tx's contract_prop does not match the stored contract box".into(),
            ));
        }

        let contract_value = ContractValue::from_json(&box_value)
            .map_err(|_| EngineError::Malformed("contract box value is not well-formed".into()))?;

        let (claimed_role, caller_pub) = &tx.party;
        let actual_role = contract_value.role_of(caller_pub).ok_or_else(|| {
            EngineError::StateInvalid("caller is not a party to this contract".into())
        })?;
        if actual_role != *claimed_role {
            return Err(EngineError::StateInvalid(format!(
                "caller is {actual_role:?} in this contract, not {claimed_role:?}"
            )));
        }

        let registered = registered_role(&self.store, caller_pub).ok_or_else(|| {
            EngineError::StateInvalid("caller has no registered profile role".into())
        })?;
        if registered != *claimed_role {
            return Err(EngineError::StateInvalid(format!(
                "caller's registered role {registered:?} does not match claimed role {claimed_role:?}"
            )));
        }

        let outcome = contract::dispatch(
            &tx.method,
            *claimed_role,
            &contract_value,
            &tx.params,
            tx.ts,
        )?;

        match outcome {
            MethodOutcome::Updated(new_value) => {
                let nonce = tx.output_nonce();
                let new_box = BoxRecord::Contract {
                    prop: tx.contract_prop.clone(),
                    nonce,
                    value: new_value.to_json(),
                };
                Ok(TxDelta {
                    removed: vec![tx.contract_box_id],
                    appended: vec![new_box],
                })
            }
            MethodOutcome::Query(_) => Ok(TxDelta::empty()),
        }
    }

    fn check_profile_transaction(&self, tx: &ProfileTransaction) -> Result<TxDelta, EngineError> {
        let mut appended = Vec::with_capacity(tx.kv.len());
        for (field, value) in &tx.kv {
            let id = profile_box_id(&tx.from, field);
            if self.store.get(&id).is_some() {
                return Err(EngineError::StateInvalid(format!(
                    "profile field {field:?} already set for this key"
                )));
            }
            appended.push(BoxRecord::Profile {
                prop: tx.from,
                value: value.clone(),
                field: field.clone(),
            });
        }
        Ok(TxDelta {
            removed: Vec::new(),
            appended,
        })
    }
}
