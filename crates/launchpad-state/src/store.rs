//! StateStore — redb-backed resource ledger.
//!
//! Provides typed operations over owned resources, object version histories,
//! and deployment records. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe ledger backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "ledger opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory ledger (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory ledger opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Resources ──────────────────────────────────────────────────

    /// Get a resource record by name.
    pub fn get_resource(&self, name: &str) -> StateResult<Option<ResourceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: ResourceRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List every resource record.
    pub fn list_resources(&self) -> StateResult<Vec<ResourceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ResourceRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// List the resources recorded for one owner.
    pub fn list_resources_owned_by(&self, owner: &str) -> StateResult<Vec<ResourceRecord>> {
        Ok(self
            .list_resources()?
            .into_iter()
            .filter(|r| r.owner == owner)
            .collect())
    }

    /// Insert or replace a record without ownership checks.
    ///
    /// Used to register resources created outside Launchpad.
    pub fn put_resource(&self, record: &ResourceRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            table
                .insert(record.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %record.name, owner = %record.owner, "resource stored");
        Ok(())
    }

    /// Apply a changeset on behalf of `owner` in one write transaction.
    ///
    /// Every touched name must be unowned or owned by `owner`. On the first
    /// violation the transaction is aborted and nothing is written.
    pub fn commit_changes(&self, owner: &str, changes: &[LedgerChange]) -> StateResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;

        let result = (|| -> StateResult<usize> {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            for change in changes {
                let name = change.name();
                let existing: Option<ResourceRecord> = table
                    .get(name)
                    .map_err(map_err!(Read))?
                    .map(|guard| serde_json::from_slice(guard.value()))
                    .transpose()
                    .map_err(map_err!(Deserialize))?;

                if let Some(existing) = &existing
                    && existing.owner != owner
                {
                    return Err(StateError::NameConflict {
                        name: name.to_string(),
                        owner: existing.owner.clone(),
                        requested_by: owner.to_string(),
                    });
                }

                match change {
                    LedgerChange::Put(record) => {
                        if record.owner != owner {
                            return Err(StateError::NameConflict {
                                name: name.to_string(),
                                owner: record.owner.clone(),
                                requested_by: owner.to_string(),
                            });
                        }
                        let mut record = record.clone();
                        if let Some(existing) = &existing {
                            record.created_at = existing.created_at;
                        }
                        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                        table
                            .insert(name, value.as_slice())
                            .map_err(map_err!(Write))?;
                    }
                    LedgerChange::Delete { .. } => {
                        table.remove(name).map_err(map_err!(Write))?;
                    }
                }
            }
            Ok(changes.len())
        })();

        match result {
            Ok(applied) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(%owner, applied, "changeset committed");
                Ok(applied)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                warn!(%owner, error = %e, "changeset aborted");
                Err(e)
            }
        }
    }

    // ── Objects ────────────────────────────────────────────────────

    /// Get the version history of an object.
    pub fn get_object(&self, bucket: &str, key: &str) -> StateResult<Option<ObjectRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        match table.get(object_key(bucket, key).as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: ObjectRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List objects in a bucket.
    pub fn list_objects(&self, bucket: &str) -> StateResult<Vec<ObjectRecord>> {
        let prefix = format!("{bucket}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: ObjectRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Append a new current version, superseding the previous current one.
    pub fn append_object_version(
        &self,
        bucket: &str,
        key: &str,
        version: ObjectVersion,
    ) -> StateResult<ObjectRecord> {
        let table_key = object_key(bucket, key);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record = {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
            let existing: Option<ObjectRecord> = table
                .get(table_key.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| serde_json::from_slice(guard.value()))
                .transpose()
                .map_err(map_err!(Deserialize))?;

            let mut record = existing.unwrap_or_else(|| ObjectRecord {
                bucket: bucket.to_string(),
                key: key.to_string(),
                versions: Vec::new(),
            });
            for v in record.versions.iter_mut().filter(|v| v.superseded_at.is_none()) {
                v.superseded_at = Some(version.created_at);
            }
            record.versions.push(version);

            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(table_key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            record
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(record)
    }

    /// Drop object versions for which `keep` returns false. Returns the number removed.
    ///
    /// Objects left with no versions are removed entirely.
    pub fn retain_object_versions(
        &self,
        bucket: &str,
        keep: impl Fn(&ObjectVersion) -> bool,
    ) -> StateResult<usize> {
        let records = self.list_objects(bucket)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = 0;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
            for mut record in records {
                let before = record.versions.len();
                record.versions.retain(|v| keep(v));
                let dropped = before - record.versions.len();
                if dropped == 0 {
                    continue;
                }
                removed += dropped;
                let table_key = record.table_key();
                if record.versions.is_empty() {
                    table.remove(table_key.as_str()).map_err(map_err!(Write))?;
                } else {
                    let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    table
                        .insert(table_key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(removed)
    }

    // ── Deployments ────────────────────────────────────────────────

    /// Insert or update a deployment record.
    pub fn put_deployment<T: Serialize>(&self, id: &str, record: &T) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a deployment record by id.
    pub fn get_deployment<T: DeserializeOwned>(&self, id: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List deployment ids in key order.
    pub fn list_deployment_ids(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }
}
