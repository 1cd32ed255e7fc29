//! Shared test helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vecbridge::application::service::VectorService;
use vecbridge::domain::error::DomainError;
use vecbridge::domain::ports::mapping_store::MappingStore;
use vecbridge::domain::ports::vector_engine::VectorEngine;
use vecbridge::domain::values::handle::Handle;
use vecbridge::infrastructure::engine::flat::FlatIndex;
use vecbridge::infrastructure::mapping::memory::MemoryMappingStore;
use vecbridge::infrastructure::mapping::redb_store::RedbMappingStore;
use vecbridge::infrastructure::sqlite::mapping_store::SqliteMappingStore;

/// The six axis-aligned unit vectors of the fixture corpus, ids `a`..`f`.
pub const SIX_DIM_FIXTURE: [(&str, [f64; 6]); 6] = [
    ("a", [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("b", [0.0, 1.0, 0.0, 0.0, 0.0, 0.0]),
    ("c", [0.0, 0.0, 1.0, 0.0, 0.0, 0.0]),
    ("d", [0.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
    ("e", [0.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
    ("f", [0.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
];

pub fn memory_service(dimension: Option<usize>) -> Arc<VectorService> {
    service_with_store(dimension, Arc::new(MemoryMappingStore::new()))
}

pub fn service_with_store(dimension: Option<usize>, store: Arc<dyn MappingStore>) -> Arc<VectorService> {
    Arc::new(VectorService::new(Arc::new(FlatIndex::in_memory(dimension)), store))
}

pub fn seeded_service(store: Arc<dyn MappingStore>) -> Arc<VectorService> {
    let service = service_with_store(Some(6), store);
    for (id, v) in SIX_DIM_FIXTURE {
        service.insert(&v, id.as_bytes()).unwrap();
    }
    service
}

/// Every backend that needs no external server, each rooted in `dir`.
pub fn local_backends(dir: &std::path::Path) -> Vec<(&'static str, Arc<dyn MappingStore>)> {
    #[cfg_attr(not(feature = "rocksdb"), allow(unused_mut))]
    let mut backends: Vec<(&'static str, Arc<dyn MappingStore>)> = vec![
        ("inmem", Arc::new(MemoryMappingStore::new())),
        ("sqlite-memory", Arc::new(SqliteMappingStore::open(":memory:").unwrap())),
        (
            "sqlite-file",
            Arc::new(SqliteMappingStore::open(&dir.join("kvs.db").to_string_lossy()).unwrap()),
        ),
        ("redb", Arc::new(RedbMappingStore::open(dir.join("kvs.redb")).unwrap())),
    ];
    #[cfg(feature = "rocksdb")]
    backends.push((
        "rocksdb",
        Arc::new(
            vecbridge::infrastructure::mapping::rocks::RocksMappingStore::open(&dir.join("rocks"))
                .unwrap(),
        ),
    ));
    backends
}

/// Mapping store whose writes can be made to fail on demand.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryMappingStore,
    pub fail_set: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl MappingStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    fn get_handle(&self, id: &[u8]) -> Result<Handle, DomainError> {
        self.inner.get_handle(id)
    }

    fn get_id(&self, handle: Handle) -> Result<Vec<u8>, DomainError> {
        self.inner.get_id(handle)
    }

    fn set(&self, id: &[u8], handle: Handle) -> Result<(), DomainError> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(DomainError::BackendUnavailable("set refused".into()));
        }
        self.inner.set(id, handle)
    }

    fn delete(&self, id: &[u8]) -> Result<(), DomainError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(DomainError::BackendUnavailable("delete refused".into()));
        }
        self.inner.delete(id)
    }

    fn close(&self) -> Result<(), DomainError> {
        self.inner.close()
    }
}

/// Engine whose `remove` can be made to fail on demand.
pub struct FlakyEngine {
    pub inner: FlatIndex,
    pub fail_remove: AtomicBool,
}

impl FlakyEngine {
    pub fn new(dimension: Option<usize>) -> Self {
        Self {
            inner: FlatIndex::in_memory(dimension),
            fail_remove: AtomicBool::new(false),
        }
    }
}

impl VectorEngine for FlakyEngine {
    fn insert(&self, vector: &[f64]) -> Result<Handle, DomainError> {
        self.inner.insert(vector)
    }

    fn remove(&self, handle: Handle) -> Result<(), DomainError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(DomainError::BackendUnavailable("remove refused".into()));
        }
        self.inner.remove(handle)
    }

    fn search(&self, vector: &[f64], k: usize, epsilon: f32) -> Result<Vec<(Handle, f32)>, DomainError> {
        self.inner.search(vector, k, epsilon)
    }

    fn get_vector(&self, handle: Handle) -> Result<Vec<f64>, DomainError> {
        self.inner.get_vector(handle)
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }

    fn create_index(&self, pool_size: usize) -> Result<(), DomainError> {
        self.inner.create_index(pool_size)
    }

    fn save_index(&self) -> Result<(), DomainError> {
        self.inner.save_index()
    }
}
