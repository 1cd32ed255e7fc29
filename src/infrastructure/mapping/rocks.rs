//! Embedded log-structured mapping store backed by RocksDB.
//!
//! # Column Families
//!
//! - `kv`: external id bytes -> 4-byte little-endian handle
//! - `vk`: 4-byte little-endian handle -> external id bytes
//!
//! Both column families are written through a single `WriteBatch`, which
//! RocksDB applies atomically. Read-check-write sequences in `set`/`delete`
//! are serialized by `write_lock` so two writers cannot interleave between
//! the check and the batch.

use crate::domain::error::DomainError;
use crate::domain::ports::mapping_store::MappingStore;
use crate::domain::values::external_id::display_id;
use crate::domain::values::handle::{decode_handle, encode_handle, Handle};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::{Mutex, RwLock};
use tracing::error;

const CF_FORWARD: &str = "kv";
const CF_INVERSE: &str = "vk";

fn rocks_err(e: rocksdb::Error) -> DomainError {
    DomainError::BackendUnavailable(format!("rocksdb: {e}"))
}

pub struct RocksMappingStore {
    db: RwLock<Option<DB>>,
    write_lock: Mutex<()>,
}

impl RocksMappingStore {
    pub fn open(path: &Path) -> Result<Self, DomainError> {
        let path_str = path.to_string_lossy().to_string();

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_FORWARD, Options::default()),
            ColumnFamilyDescriptor::new(CF_INVERSE, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, &path_str, cf_descriptors).map_err(|e| {
            error!(path = %path_str, error = %e, "Failed to open RocksDB mapping store");
            DomainError::BackendUnavailable(format!("path={path_str}: {e}"))
        })?;

        Ok(Self {
            db: RwLock::new(Some(db)),
            write_lock: Mutex::new(()),
        })
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&DB, &ColumnFamily, &ColumnFamily) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let guard = self
            .db
            .read()
            .map_err(|e| DomainError::BackendUnavailable(e.to_string()))?;
        let db = guard
            .as_ref()
            .ok_or_else(|| DomainError::BackendUnavailable("rocksdb store is closed".into()))?;
        let forward = db
            .cf_handle(CF_FORWARD)
            .ok_or_else(|| DomainError::BackendUnavailable(format!("column family not found: {CF_FORWARD}")))?;
        let inverse = db
            .cf_handle(CF_INVERSE)
            .ok_or_else(|| DomainError::BackendUnavailable(format!("column family not found: {CF_INVERSE}")))?;
        f(db, forward, inverse)
    }

    fn lock_writes(&self) -> Result<std::sync::MutexGuard<'_, ()>, DomainError> {
        self.write_lock
            .lock()
            .map_err(|e| DomainError::BackendUnavailable(e.to_string()))
    }
}

impl MappingStore for RocksMappingStore {
    fn name(&self) -> &str {
        "rocksdb"
    }

    fn get_handle(&self, id: &[u8]) -> Result<Handle, DomainError> {
        self.with_db(|db, forward, _| {
            let raw = db
                .get_cf(forward, id)
                .map_err(rocks_err)?
                .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))?;
            decode_handle(&raw)
        })
    }

    fn get_id(&self, handle: Handle) -> Result<Vec<u8>, DomainError> {
        self.with_db(|db, _, inverse| {
            db.get_cf(inverse, encode_handle(handle))
                .map_err(rocks_err)?
                .ok_or_else(|| DomainError::NotFound(format!("handle {handle}")))
        })
    }

    fn get_ids(&self, handles: &[Handle]) -> Result<Vec<Vec<u8>>, DomainError> {
        self.with_db(|db, _, inverse| {
            let keys: Vec<_> = handles.iter().map(|h| (inverse, encode_handle(*h))).collect();
            db.multi_get_cf(keys)
                .into_iter()
                .zip(handles)
                .map(|(res, h)| {
                    res.map_err(rocks_err)?
                        .ok_or_else(|| DomainError::NotFound(format!("handle {h}")))
                })
                .collect()
        })
    }

    fn set(&self, id: &[u8], handle: Handle) -> Result<(), DomainError> {
        let _writes = self.lock_writes()?;
        let encoded = encode_handle(handle);
        self.with_db(|db, forward, inverse| {
            if let Some(owner) = db.get_cf(inverse, encoded).map_err(rocks_err)? {
                if owner != id {
                    return Err(DomainError::Conflict(format!(
                        "handle {handle} already bound to {}",
                        display_id(&owner)
                    )));
                }
            }

            let mut batch = WriteBatch::default();
            if let Some(previous) = db.get_cf(forward, id).map_err(rocks_err)? {
                if previous.as_slice() != encoded.as_slice() {
                    batch.delete_cf(inverse, previous);
                }
            }
            batch.put_cf(forward, id, encoded);
            batch.put_cf(inverse, encoded, id);
            db.write(batch).map_err(rocks_err)
        })
    }

    fn delete(&self, id: &[u8]) -> Result<(), DomainError> {
        let _writes = self.lock_writes()?;
        self.with_db(|db, forward, inverse| {
            let raw = db
                .get_cf(forward, id)
                .map_err(rocks_err)?
                .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))?;

            let mut batch = WriteBatch::default();
            batch.delete_cf(forward, id);
            batch.delete_cf(inverse, raw);
            db.write(batch).map_err(rocks_err)
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
