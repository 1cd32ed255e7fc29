//! Embedded single-file mapping store backed by redb.
//!
//! The forward and inverse tables live in the same database file, so a
//! `set`/`delete` commits both in one write transaction.

use crate::domain::error::DomainError;
use crate::domain::ports::mapping_store::MappingStore;
use crate::domain::values::external_id::display_id;
use crate::domain::values::handle::{decode_handle, encode_handle, Handle};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::RwLock;

const FORWARD: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");
const INVERSE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("vk");

fn redb_err<E: Into<redb::Error>>(e: E) -> DomainError {
    DomainError::BackendUnavailable(format!("redb: {}", e.into()))
}

pub struct RedbMappingStore {
    db: RwLock<Option<Database>>,
}

impl RedbMappingStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DomainError> {
        let db = Database::create(path.as_ref()).map_err(redb_err)?;

        let txn = db.begin_write().map_err(redb_err)?;
        {
            txn.open_table(FORWARD).map_err(redb_err)?;
            txn.open_table(INVERSE).map_err(redb_err)?;
        }
        txn.commit().map_err(redb_err)?;

        Ok(Self {
            db: RwLock::new(Some(db)),
        })
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let guard = self
            .db
            .read()
            .map_err(|e| DomainError::BackendUnavailable(e.to_string()))?;
        let db = guard
            .as_ref()
            .ok_or_else(|| DomainError::BackendUnavailable("redb store is closed".into()))?;
        f(db)
    }

    fn read_inverse(db: &Database, handles: &[Handle]) -> Result<Vec<Vec<u8>>, DomainError> {
        let txn = db.begin_read().map_err(redb_err)?;
        let table = txn.open_table(INVERSE).map_err(redb_err)?;
        handles
            .iter()
            .map(|h| {
                let key = encode_handle(*h);
                table
                    .get(key.as_slice())
                    .map_err(redb_err)?
                    .map(|v| v.value().to_vec())
                    .ok_or_else(|| DomainError::NotFound(format!("handle {h}")))
            })
            .collect()
    }
}

impl MappingStore for RedbMappingStore {
    fn name(&self) -> &str {
        "redb"
    }

    fn get_handle(&self, id: &[u8]) -> Result<Handle, DomainError> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(redb_err)?;
            let table = txn.open_table(FORWARD).map_err(redb_err)?;
            let raw = table
                .get(id)
                .map_err(redb_err)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))?;
            decode_handle(&raw)
        })
    }

    fn get_id(&self, handle: Handle) -> Result<Vec<u8>, DomainError> {
        self.with_db(|db| {
            let mut ids = Self::read_inverse(db, &[handle])?;
            ids.pop()
                .ok_or_else(|| DomainError::NotFound(format!("handle {handle}")))
        })
    }

    fn get_ids(&self, handles: &[Handle]) -> Result<Vec<Vec<u8>>, DomainError> {
        self.with_db(|db| Self::read_inverse(db, handles))
    }

    fn set(&self, id: &[u8], handle: Handle) -> Result<(), DomainError> {
        let encoded = encode_handle(handle);
        self.with_db(|db| {
            let txn = db.begin_write().map_err(redb_err)?;
            {
                let mut forward = txn.open_table(FORWARD).map_err(redb_err)?;
                let mut inverse = txn.open_table(INVERSE).map_err(redb_err)?;

                let owner = inverse
                    .get(encoded.as_slice())
                    .map_err(redb_err)?
                    .map(|v| v.value().to_vec());
                if let Some(owner) = owner {
                    if owner != id {
                        // Dropping the transaction uncommitted aborts it.
                        return Err(DomainError::Conflict(format!(
                            "handle {handle} already bound to {}",
                            display_id(&owner)
                        )));
                    }
                }

                let previous = forward
                    .get(id)
                    .map_err(redb_err)?
                    .map(|v| v.value().to_vec());
                if let Some(previous) = previous {
                    if previous.as_slice() != encoded.as_slice() {
                        inverse.remove(previous.as_slice()).map_err(redb_err)?;
                    }
                }

                forward.insert(id, encoded.as_slice()).map_err(redb_err)?;
                inverse.insert(encoded.as_slice(), id).map_err(redb_err)?;
            }
            txn.commit().map_err(redb_err)
        })
    }

    fn delete(&self, id: &[u8]) -> Result<(), DomainError> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(redb_err)?;
            {
                let mut forward = txn.open_table(FORWARD).map_err(redb_err)?;
                let mut inverse = txn.open_table(INVERSE).map_err(redb_err)?;
                let raw = forward
                    .remove(id)
                    .map_err(redb_err)?
                    .map(|v| v.value().to_vec())
                    .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))?;
                inverse.remove(raw.as_slice()).map_err(redb_err)?;
            }
            txn.commit().map_err(redb_err)
        })
    }

    fn close(&self) -> Result<(), DomainError> {
        let mut guard = self
            .db
            .write()
            .map_err(|e| DomainError::BackendUnavailable(e.to_string()))?;
        guard.take();
        Ok(())
    }
}
