//! Consistency layer over a vector engine and a mapping store.
//!
//! Every operation that touches both stores runs the engine step first and
//! the mapping step second. Mutations hold the write side of `lane` so the
//! engine never sees two mutating calls at once; queries hold the read side.

use crate::domain::entities::record::{Record, SearchHit};
use crate::domain::error::DomainError;
use crate::domain::ports::mapping_store::MappingStore;
use crate::domain::ports::vector_engine::VectorEngine;
use crate::domain::values::external_id::display_id;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, warn};

/// Default approximate-search slack, matching the common engine default.
pub const DEFAULT_EPSILON: f32 = 0.1;

/// Per-element outcome of a batched insert or remove.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub index: usize,
    pub id: String,
    pub message: String,
}

impl BatchReport {
    fn record(&mut self, index: usize, id: &[u8], result: Result<(), DomainError>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => self.errors.push(BatchError {
                index,
                id: display_id(id),
                message: e.to_string(),
            }),
        }
    }
}

pub struct VectorService {
    engine: Arc<dyn VectorEngine>,
    store: Arc<dyn MappingStore>,
    lane: RwLock<()>,
    ingesting: AtomicBool,
}

/// Marks a bulk ingestion as in progress; released on drop.
pub struct IngestGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for IngestGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl VectorService {
    pub fn new(engine: Arc<dyn VectorEngine>, store: Arc<dyn MappingStore>) -> Self {
        Self {
            engine,
            store,
            lane: RwLock::new(()),
            ingesting: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn VectorEngine> {
        &self.engine
    }

    fn read_lane(&self) -> Result<RwLockReadGuard<'_, ()>, DomainError> {
        self.lane
            .read()
            .map_err(|e| DomainError::BackendUnavailable(format!("service lane poisoned: {e}")))
    }

    fn write_lane(&self) -> Result<RwLockWriteGuard<'_, ()>, DomainError> {
        self.lane
            .write()
            .map_err(|e| DomainError::BackendUnavailable(format!("service lane poisoned: {e}")))
    }

    /// Claims the single bulk-ingestion slot.
    pub fn begin_ingest(&self) -> Result<IngestGuard<'_>, DomainError> {
        self.ingesting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DomainError::AlreadyRunning)?;
        Ok(IngestGuard {
            flag: &self.ingesting,
        })
    }

    /// Stores `vector` under `id`. An id that is already live is rejected
    /// with `Conflict`; remove it first to replace its vector.
    ///
    /// If the mapping store rejects the record after the engine accepted it,
    /// the engine insert is rolled back. Only when that rollback also fails
    /// does the caller see `ConsistencyWindow`.
    pub fn insert(&self, vector: &[f64], id: &[u8]) -> Result<Record, DomainError> {
        let _lane = self.write_lane()?;
        match self.store.get_handle(id) {
            Ok(existing) => {
                return Err(DomainError::Conflict(format!(
                    "id {} already bound to handle {existing}",
                    display_id(id)
                )))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let handle = self.engine.insert(vector)?;

        if let Err(set_err) = self.store.set(id, handle) {
            return match self.engine.remove(handle) {
                Ok(()) => {
                    warn!(id = %display_id(id), handle, error = %set_err, "mapping rejected, engine insert rolled back");
                    Err(set_err)
                }
                Err(rollback_err) => {
                    error!(
                        id = %display_id(id),
                        handle,
                        error = %set_err,
                        rollback_error = %rollback_err,
                        "engine holds an unmapped vector"
                    );
                    Err(DomainError::ConsistencyWindow {
                        operation: "insert",
                        handle,
                        source: Box::new(set_err),
                    })
                }
            };
        }

        debug!(id = %display_id(id), handle, "inserted");
        Ok(Record {
            external_id: id.to_vec(),
            handle,
        })
    }

    /// Removes `id` from the engine, then from the mapping store.
    ///
    /// A mapping-store failure after the engine removal leaves a stale
    /// mapping behind and is reported as `ConsistencyWindow`.
    pub fn remove(&self, id: &[u8]) -> Result<(), DomainError> {
        let _lane = self.write_lane()?;
        let handle = self.store.get_handle(id)?;
        self.engine.remove(handle)?;

        if let Err(delete_err) = self.store.delete(id) {
            error!(id = %display_id(id), handle, error = %delete_err, "stale mapping left after engine removal");
            return Err(DomainError::ConsistencyWindow {
                operation: "remove",
                handle,
                source: Box::new(delete_err),
            });
        }
        debug!(id = %display_id(id), handle, "removed");
        Ok(())
    }

    pub fn search(
        &self,
        vector: &[f64],
        size: usize,
        epsilon: f32,
    ) -> Result<Vec<SearchHit>, DomainError> {
        let _lane = self.read_lane()?;
        self.search_unlocked(vector, size, epsilon)
    }

    /// Self-search: the query is the vector stored under `id`.
    pub fn search_by_id(
        &self,
        id: &[u8],
        size: usize,
        epsilon: f32,
    ) -> Result<Vec<SearchHit>, DomainError> {
        let _lane = self.read_lane()?;
        let handle = self.store.get_handle(id)?;
        let vector = self.engine.get_vector(handle)?;
        self.search_unlocked(&vector, size, epsilon)
    }

    fn search_unlocked(
        &self,
        vector: &[f64],
        size: usize,
        epsilon: f32,
    ) -> Result<Vec<SearchHit>, DomainError> {
        let results = self.engine.search(vector, size, epsilon)?;
        let handles: Vec<_> = results.iter().map(|(h, _)| *h).collect();
        let ids = self.store.get_ids(&handles)?;
        Ok(ids
            .into_iter()
            .zip(results)
            .map(|(id, (_, distance))| SearchHit { id, distance })
            .collect())
    }

    /// Applies [`insert`](Self::insert) to each `(id, vector)` pair; failures
    /// are collected, never fatal to the batch.
    pub fn insert_many(&self, items: &[(Vec<u8>, Vec<f64>)]) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, (id, vector)) in items.iter().enumerate() {
            report.record(index, id, self.insert(vector, id).map(|_| ()));
        }
        report
    }

    pub fn remove_many(&self, ids: &[Vec<u8>]) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, id) in ids.iter().enumerate() {
            report.record(index, id, self.remove(id));
        }
        report
    }

    /// Stored vectors for each id, positionally aligned with `ids`.
    pub fn get_objects(&self, ids: &[Vec<u8>]) -> Vec<Result<Vec<f64>, DomainError>> {
        let lane = match self.read_lane() {
            Ok(lane) => lane,
            Err(e) => {
                let message = e.to_string();
                return ids
                    .iter()
                    .map(|_| Err(DomainError::BackendUnavailable(message.clone())))
                    .collect();
            }
        };
        let objects = ids
            .iter()
            .map(|id| {
                let handle = self.store.get_handle(id)?;
                self.engine.get_vector(handle)
            })
            .collect();
        drop(lane);
        objects
    }

    pub fn dimension(&self) -> Option<usize> {
        self.engine.dimension()
    }

    pub fn create_index(&self, pool_size: usize) -> Result<(), DomainError> {
        let _lane = self.write_lane()?;
        self.engine.create_index(pool_size)
    }

    pub fn save_index(&self) -> Result<(), DomainError> {
        let _lane = self.read_lane()?;
        self.engine.save_index()
    }

    /// Closes the mapping store. The service must not be used afterwards.
    pub fn close(&self) -> Result<(), DomainError> {
        let _lane = self.write_lane()?;
        self.store.close()
    }
}
