//! In-memory box store.
//!
//! Useful for unit tests and small simulations. Keeps the live box set in
//! a `HashMap` and every committed delta in an ordered log so rollback
//! can replay inverses back to any earlier version.

use std::collections::HashMap;

use super::{BoxStore, StoreDelta, StoreError};
use crate::types::{BoxId, BoxRecord, Hash256};

#[derive(Default)]
pub struct InMemoryBoxStore {
    boxes: HashMap<BoxId, BoxRecord>,
    log: Vec<StoreDelta>,
}

impl InMemoryBoxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    fn position_of(&self, version: &Hash256) -> Option<usize> {
        self.log.iter().position(|d| &d.version == version)
    }
}

impl BoxStore for InMemoryBoxStore {
    fn get(&self, id: &BoxId) -> Option<BoxRecord> {
        self.boxes.get(id).cloned()
    }

    fn commit(&mut self, delta: StoreDelta) -> Result<(), StoreError> {
        for id in &delta.removed {
            if !self.boxes.contains_key(id) {
                return Err(StoreError::UnknownBox(*id));
            }
        }
        for id in &delta.removed {
            self.boxes.remove(id);
        }
        for b in &delta.appended {
            self.boxes.insert(b.id(), b.clone());
        }
        self.log.push(delta);
        Ok(())
    }

    fn rollback_to(&mut self, version: &Hash256) -> Result<(), StoreError> {
        let keep = self.position_of(version).map(|i| i + 1).unwrap_or(0);
        if keep == 0 && self.position_of(version).is_none() {
            return Err(StoreError::UnknownVersion(*version));
        }

        for delta in self.log[keep..].iter().rev() {
            for b in &delta.appended {
                self.boxes.remove(&b.id());
            }
            for id in &delta.removed {
                // The box's full record was dropped from `boxes` on the
                // original commit, but is still recoverable from the
                // delta that removed it, deltas are never discarded by
                // this in-memory backend, so inverting just means we'd
                // need the original record, which callers must re-supply
                // via `appended` on a prior delta. In practice every
                // removed box id was introduced by an earlier `appended`
                // entry still present in the surviving log, so replay it
                // from there.
                if let Some(original) = self.log[..keep]
                    .iter()
                    .flat_map(|d| d.appended.iter())
                    .find(|b| b.id() == *id)
                    .cloned()
                {
                    self.boxes.insert(*id, original);
                }
            }
        }
        self.log.truncate(keep);
        Ok(())
    }

    fn last_version_id(&self) -> Option<Hash256> {
        self.log.last().map(|d| d.version)
    }

    fn last_timestamp(&self) -> Option<u64> {
        self.log.last().map(|d| d.timestamp)
    }
}
