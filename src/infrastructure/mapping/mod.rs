pub mod memory;
pub mod redb_store;
pub mod redis_store;
#[cfg(feature = "rocksdb")]
pub mod rocks;

use crate::config::BackendConfig;
use crate::domain::error::DomainError;
use crate::domain::ports::mapping_store::MappingStore;
use crate::infrastructure::sqlite::mapping_store::SqliteMappingStore;
use std::sync::Arc;
use tracing::info;

/// Opens the mapping store selected by `config`.
pub fn open_mapping_store(config: &BackendConfig) -> Result<Arc<dyn MappingStore>, DomainError> {
    let store: Arc<dyn MappingStore> = match config {
        BackendConfig::Memory => Arc::new(memory::MemoryMappingStore::new()),
        BackendConfig::Redb { path } => {
            ensure_parent(path)?;
            Arc::new(redb_store::RedbMappingStore::open(path)?)
        }
        #[cfg(feature = "rocksdb")]
        BackendConfig::Rocks { path } => Arc::new(rocks::RocksMappingStore::open(path)?),
        #[cfg(not(feature = "rocksdb"))]
        BackendConfig::Rocks { .. } => {
            return Err(DomainError::Config(
                "rocksdb backend requires building with the `rocksdb` feature".into(),
            ))
        }
        BackendConfig::Sqlite { path } => {
            ensure_parent(path)?;
            Arc::new(SqliteMappingStore::open(&path.to_string_lossy())?)
        }
        BackendConfig::Redis(options) => Arc::new(redis_store::RedisMappingStore::connect(options)?),
    };
    info!(backend = store.name(), "mapping store opened");
    Ok(store)
}

fn ensure_parent(path: &std::path::Path) -> Result<(), DomainError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| DomainError::BackendUnavailable(format!("{}: {e}", parent.display()))),
        _ => Ok(()),
    }
}
