//! RocksDB-backed box store.
//!
//! RocksDB has no native concept of a named, reopenable snapshot, so
//! rollback is built on a small log-structured scheme instead:
//!
//! - `"boxes"`:    current live `BoxId` -> canonical box bytes.
//! - `"log"`:      append-only `u64_be(seq)` -> encoded [`PersistedDelta`],
//!                 one entry per committed version, in commit order.
//! - `"versions"`: `version_id` (32 bytes) -> `u64_be(seq)`, so a named
//!                 rollback target can be found without scanning the log.
//! - `"meta"`:     fixed keys `"head_seq"` / `"head_version"`.
//!
//! `rollback_to` walks the log backwards from the current head to the
//! target sequence number, inverting each delta (re-inserting what it
//! removed, deleting what it appended) and rewinding the head pointer.
//! Log entries beyond the new head are left in place rather than
//! deleted, they are simply unreachable until overwritten by the next
//! commit, which reuses their sequence numbers.

use std::{path::Path, sync::Arc};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, WriteBatch, DB, Options};
use serde::{Deserialize, Serialize};

use super::{BoxStore, StoreDelta, StoreError};
use crate::types::{BoxId, BoxRecord, Hash256, HASH_LEN};

const CF_BOXES: &str = "boxes";
const CF_LOG: &str = "log";
const CF_VERSIONS: &str = "versions";
const CF_META: &str = "meta";

const META_HEAD_SEQ: &[u8] = b"head_seq";
const META_HEAD_VERSION: &[u8] = b"head_version";
const META_HEAD_TS: &[u8] = b"head_ts";

#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    pub path: String,
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/triledger-db".to_string(),
            create_if_missing: true,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedDelta {
    timestamp: u64,
    removed: Vec<(Hash256, Vec<u8>)>,
    appended: Vec<(Hash256, Vec<u8>)>,
}

pub struct RocksDbBoxStore {
    db: DB,
}

impl RocksDbBoxStore {
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StoreError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_BOXES, Options::default()),
            ColumnFamilyDescriptor::new(CF_LOG, Options::default()),
            ColumnFamilyDescriptor::new(CF_VERSIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }

    fn head_seq(&self) -> Result<u64, StoreError> {
        let meta = self.cf(CF_META)?;
        match self
            .db
            .get_cf(&meta, META_HEAD_SEQ)
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            None => Ok(0),
            Some(bytes) => Ok(be_u64(&bytes)),
        }
    }
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(arr)
}

impl BoxStore for RocksDbBoxStore {
    fn get(&self, id: &BoxId) -> Option<BoxRecord> {
        let cf = self.cf(CF_BOXES).ok()?;
        let bytes = self.db.get_cf(&cf, id.as_bytes()).ok()??;
        BoxRecord::decode(&bytes).ok()
    }

    fn commit(&mut self, delta: StoreDelta) -> Result<(), StoreError> {
        let cf_boxes = self.cf(CF_BOXES)?;
        let cf_log = self.cf(CF_LOG)?;
        let cf_versions = self.cf(CF_VERSIONS)?;
        let cf_meta = self.cf(CF_META)?;

        let mut removed = Vec::with_capacity(delta.removed.len());
        for id in &delta.removed {
            let bytes = self
                .db
                .get_cf(&cf_boxes, id.as_bytes())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .ok_or(StoreError::UnknownBox(*id))?;
            removed.push((*id, bytes));
        }
        let appended: Vec<(Hash256, Vec<u8>)> = delta
            .appended
            .iter()
            .map(|b| (b.id(), b.encode()))
            .collect();

        let seq = self.head_seq()? + 1;
        let persisted = PersistedDelta {
            timestamp: delta.timestamp,
            removed: removed.clone(),
            appended: appended.clone(),
        };
        let cfg = bincode::config::standard();
        let persisted_bytes = bincode::serde::encode_to_vec(&persisted, cfg)
            .expect("PersistedDelta always encodes");

        let mut batch = WriteBatch::default();
        for (id, _) in &removed {
            batch.delete_cf(&cf_boxes, id.as_bytes());
        }
        for (id, bytes) in &appended {
            batch.put_cf(&cf_boxes, id.as_bytes(), bytes);
        }
        batch.put_cf(&cf_log, seq.to_be_bytes(), &persisted_bytes);
        batch.put_cf(&cf_versions, delta.version.as_bytes(), seq.to_be_bytes());
        batch.put_cf(&cf_meta, META_HEAD_SEQ, seq.to_be_bytes());
        batch.put_cf(&cf_meta, META_HEAD_VERSION, delta.version.as_bytes());
        batch.put_cf(&cf_meta, META_HEAD_TS, delta.timestamp.to_be_bytes());

        self.db
            .write(batch)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn rollback_to(&mut self, version: &Hash256) -> Result<(), StoreError> {
        let cf_versions = self.cf(CF_VERSIONS)?;
        let target_seq = self
            .db
            .get_cf(&cf_versions, version.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map(|b| be_u64(&b))
            .ok_or(StoreError::UnknownVersion(*version))?;

        let head_seq = self.head_seq()?;
        if target_seq == head_seq {
            return Ok(());
        }

        let cf_boxes = self.cf(CF_BOXES)?;
        let cf_log = self.cf(CF_LOG)?;
        let cf_meta = self.cf(CF_META)?;

        let mut batch = WriteBatch::default();
        let cfg = bincode::config::standard();

        for seq in (target_seq + 1..=head_seq).rev() {
            let bytes = self
                .db
                .get_cf(&cf_log, seq.to_be_bytes())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .ok_or_else(|| StoreError::Backend(format!("missing log entry for seq {seq}")))?;
            let (persisted, _): (PersistedDelta, usize) =
                bincode::serde::decode_from_slice(&bytes, cfg)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;

            for (id, _) in &persisted.appended {
                batch.delete_cf(&cf_boxes, id.as_bytes());
            }
            for (id, box_bytes) in &persisted.removed {
                batch.put_cf(&cf_boxes, id.as_bytes(), box_bytes);
            }
        }

        let head_ts = if target_seq == 0 {
            0
        } else {
            let bytes = self
                .db
                .get_cf(&cf_log, target_seq.to_be_bytes())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .ok_or_else(|| {
                    StoreError::Backend(format!("missing log entry for seq {target_seq}"))
                })?;
            let (persisted, _): (PersistedDelta, usize) =
                bincode::serde::decode_from_slice(&bytes, cfg)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            persisted.timestamp
        };

        batch.put_cf(&cf_meta, META_HEAD_SEQ, target_seq.to_be_bytes());
        batch.put_cf(&cf_meta, META_HEAD_VERSION, version.as_bytes());
        batch.put_cf(&cf_meta, META_HEAD_TS, head_ts.to_be_bytes());

        self.db
            .write(batch)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn last_version_id(&self) -> Option<Hash256> {
        let meta = self.cf(CF_META).ok()?;
        let bytes = self.db.get_cf(&meta, META_HEAD_VERSION).ok()??;
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Some(Hash256(arr))
    }

    fn last_timestamp(&self) -> Option<u64> {
        let meta = self.cf(CF_META).ok()?;
        let bytes = self.db.get_cf(&meta, META_HEAD_TS).ok()??;
        Some(be_u64(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ed25519Pub;
    use tempfile::TempDir;

    fn dummy_pub(byte: u8) -> Ed25519Pub {
        Ed25519Pub([byte; 32])
    }

    fn poly(byte: u8, nonce: u64, value: u64) -> BoxRecord {
        BoxRecord::Poly {
            prop: dummy_pub(byte),
            nonce,
            value,
        }
    }

    fn open_tmp() -> (TempDir, RocksDbBoxStore) {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig {
            path: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };
        let store = RocksDbBoxStore::open(&cfg).expect("open RocksDB");
        (tmp, store)
    }

    #[test]
    fn commit_and_get_roundtrip() {
        let (_tmp, mut store) = open_tmp();
        let b = poly(1, 0, 100);
        store
            .commit(StoreDelta {
                version: Hash256([1; 32]),
                timestamp: 1_000,
                removed: vec![],
                appended: vec![b.clone()],
            })
            .expect("commit");

        assert_eq!(store.get(&b.id()), Some(b));
        assert_eq!(store.last_version_id(), Some(Hash256([1; 32])));
    }

    #[test]
    fn rollback_restores_prior_state() {
        let (_tmp, mut store) = open_tmp();
        let b1 = poly(1, 0, 100);
        let v1 = Hash256([1; 32]);
        store
            .commit(StoreDelta {
                version: v1,
                timestamp: 1_000,
                removed: vec![],
                appended: vec![b1.clone()],
            })
            .unwrap();

        let b2 = poly(2, 0, 50);
        let v2 = Hash256([2; 32]);
        store
            .commit(StoreDelta {
                version: v2,
                timestamp: 1_000,
                removed: vec![b1.id()],
                appended: vec![b2.clone()],
            })
            .unwrap();

        store.rollback_to(&v1).expect("rollback");

        assert_eq!(store.get(&b1.id()), Some(b1));
        assert!(store.get(&b2.id()).is_none());
        assert_eq!(store.last_version_id(), Some(v1));
    }

    #[test]
    fn commit_fails_atomically_when_removal_is_unknown() {
        let (_tmp, mut store) = open_tmp();
        let ghost = poly(9, 9, 9).id();
        let err = store
            .commit(StoreDelta {
                version: Hash256([1; 32]),
                timestamp: 1_000,
                removed: vec![ghost],
                appended: vec![poly(1, 0, 1)],
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownBox(_)));
        assert!(store.last_version_id().is_none());
    }
}
