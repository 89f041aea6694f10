//! RecordStore — redb-backed persistence for rollout records.
//!
//! Exposes the atomic per-identity `upsert`/`delete`/`list_all` contract.
//! The fold passed to `upsert` runs inside a single write transaction, so
//! concurrent folds for the same identity serialize instead of clobbering
//! each other. A failed transaction never commits — the prior durable value
//! stays intact.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::tables::RECORDS;
use crate::types::RolloutRecord;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe rollout record store backed by redb.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    /// Open (or create) a persistent record store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory record store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    /// Create the records table if it doesn't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Atomically read-modify-write the record for `identity`.
    ///
    /// The fold receives the current record (`None` when absent) and returns
    /// the record to persist. Returning `None` leaves the store untouched —
    /// this is how a delete fold stays a no-op for an untracked identity.
    ///
    /// Returns the persisted record, or `None` when the fold declined.
    pub fn upsert<F>(&self, identity: &str, fold: F) -> StoreResult<Option<RolloutRecord>>
    where
        F: FnOnce(Option<RolloutRecord>) -> Option<RolloutRecord>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next = {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            let current = match table.get(identity).map_err(map_err!(Read))? {
                Some(guard) => Some(
                    serde_json::from_slice::<RolloutRecord>(guard.value())
                        .map_err(map_err!(Deserialize))?,
                ),
                None => None,
            };
            match fold(current) {
                Some(next) => {
                    let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
                    table
                        .insert(identity, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(next)
                }
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(next)
    }

    /// Get a record by identity.
    pub fn get(&self, identity: &str) -> StoreResult<Option<RolloutRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(identity).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: RolloutRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Delete a record by identity. Returns true if it existed; deleting an
    /// absent identity is a no-op.
    pub fn delete(&self, identity: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            existed = table.remove(identity).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%identity, existed, "record deleted");
        Ok(existed)
    }

    /// List all records.
    ///
    /// Each returned record is internally consistent (redb read transactions
    /// see committed values only). An entry that fails to deserialize is
    /// skipped with a warning rather than failing the whole listing, so one
    /// corrupt record cannot starve reconciliation of the others.
    pub fn list_all(&self) -> StoreResult<Vec<RolloutRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            match serde_json::from_slice::<RolloutRecord>(value.value()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(identity = key.value(), error = %e, "skipping unreadable record");
                }
            }
        }
        Ok(records)
    }

    /// Number of stored records.
    pub fn count(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        Ok(table.iter().map_err(map_err!(Read))?.count() as u64)
    }

    /// Write raw bytes for a key, bypassing serialization.
    #[cfg(test)]
    fn put_raw(&self, identity: &str, value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            table.insert(identity, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttrValue, SCHEMA_VERSION};
    use std::collections::BTreeMap;

    fn seed_record(identity: &str, ts: u64) -> RolloutRecord {
        RolloutRecord {
            identity: identity.to_string(),
            revision_hash: "5f6b8d9".to_string(),
            last_pod_name: format!("{identity}-5f6b8d9-x2k4p"),
            created_count: 1,
            deleted_count: 0,
            last_updated: ts,
            attributes: BTreeMap::new(),
            schema_version: SCHEMA_VERSION,
        }
    }

    // ── Upsert semantics ───────────────────────────────────────────

    #[test]
    fn upsert_creates_when_absent() {
        let store = RecordStore::open_in_memory().unwrap();

        let result = store
            .upsert("app-a", |current| {
                assert!(current.is_none());
                Some(seed_record("app-a", 1000))
            })
            .unwrap();

        assert!(result.is_some());
        let stored = store.get("app-a").unwrap().unwrap();
        assert_eq!(stored.created_count, 1);
    }

    #[test]
    fn upsert_folds_existing_record() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .upsert("app-a", |_| Some(seed_record("app-a", 1000)))
            .unwrap();

        store
            .upsert("app-a", |current| {
                let mut rec = current.unwrap();
                rec.created_count += 1;
                rec.last_updated = 1001;
                Some(rec)
            })
            .unwrap();

        let stored = store.get("app-a").unwrap().unwrap();
        assert_eq!(stored.created_count, 2);
        assert_eq!(stored.last_updated, 1001);
    }

    #[test]
    fn upsert_none_leaves_store_untouched() {
        let store = RecordStore::open_in_memory().unwrap();

        let result = store.upsert("ghost", |current| current).unwrap();

        assert!(result.is_none());
        assert!(store.get("ghost").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn upsert_does_not_cross_identities() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .upsert("app-a", |_| Some(seed_record("app-a", 1000)))
            .unwrap();
        store
            .upsert("app-b", |current| {
                assert!(current.is_none());
                Some(seed_record("app-b", 1000))
            })
            .unwrap();

        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn concurrent_upserts_lose_no_folds() {
        let store = RecordStore::open_in_memory().unwrap();

        // 10 threads x 10 folds each — every increment must survive.
        std::thread::scope(|scope| {
            for _ in 0..10 {
                let store = store.clone();
                scope.spawn(move || {
                    for _ in 0..10 {
                        store
                            .upsert("app-a", |current| {
                                Some(match current {
                                    None => seed_record("app-a", 1000),
                                    Some(mut rec) => {
                                        rec.created_count += 1;
                                        rec
                                    }
                                })
                            })
                            .unwrap();
                    }
                });
            }
        });

        let stored = store.get("app-a").unwrap().unwrap();
        assert_eq!(stored.created_count, 100);
    }

    // ── Delete ─────────────────────────────────────────────────────

    #[test]
    fn delete_is_idempotent() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .upsert("app-a", |_| Some(seed_record("app-a", 1000)))
            .unwrap();

        assert!(store.delete("app-a").unwrap());
        assert!(!store.delete("app-a").unwrap());
        assert!(!store.delete("never-existed").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    // ── Listing ────────────────────────────────────────────────────

    #[test]
    fn list_all_returns_every_record() {
        let store = RecordStore::open_in_memory().unwrap();
        for name in ["app-a", "app-b", "app-c"] {
            store
                .upsert(name, |_| Some(seed_record(name, 1000)))
                .unwrap();
        }

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn list_all_empty_store() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn list_all_skips_unreadable_records() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .upsert("app-a", |_| Some(seed_record("app-a", 1000)))
            .unwrap();
        store.put_raw("corrupt", b"{not json").unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].identity, "app-a");

        // The corrupt entry stays in place for inspection.
        assert_eq!(store.count().unwrap(), 2);
    }

    // ── Attributes survive storage ─────────────────────────────────

    #[test]
    fn attributes_roundtrip_through_storage() {
        let store = RecordStore::open_in_memory().unwrap();
        let mut rec = seed_record("app-a", 1000);
        rec.attributes
            .insert("tier".to_string(), AttrValue::Str("web".to_string()));
        rec.attributes
            .insert("canary".to_string(), AttrValue::Bool(true));
        store.upsert("app-a", |_| Some(rec.clone())).unwrap();

        let stored = store.get("app-a").unwrap().unwrap();
        assert_eq!(stored.attributes, rec.attributes);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("records.redb");

        {
            let store = RecordStore::open(&db_path).unwrap();
            store
                .upsert("app-a", |_| Some(seed_record("app-a", 1000)))
                .unwrap();
        }

        // Reopen the same database file.
        let store = RecordStore::open(&db_path).unwrap();
        let stored = store.get("app-a").unwrap();
        assert!(stored.is_some());
        assert_eq!(stored.unwrap().created_count, 1);
    }
}
