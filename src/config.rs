//! Runtime configuration: which mapping store to open, where the engine keeps
//! its index, and how wide the ingestion pipeline runs. The CLI fills these
//! from flags and `VECBRIDGE_*` environment variables.

use crate::domain::error::DomainError;
use crate::infrastructure::mapping::redis_store::RedisOptions;
use std::path::PathBuf;

pub const DEFAULT_INDEX_PATH: &str = "./vecbridge-index";
pub const DEFAULT_DB_PATH: &str = "./vecbridge-kvs.db";

#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Memory,
    Redb { path: PathBuf },
    Rocks { path: PathBuf },
    Sqlite { path: PathBuf },
    Redis(RedisOptions),
}

impl BackendConfig {
    /// Resolves a backend name (`inmem`, `redb`, `rocksdb`, `sqlite`, `redis`).
    /// `path` is used by the file-backed stores, `redis` by the remote one.
    pub fn from_name(name: &str, path: PathBuf, redis: RedisOptions) -> Result<Self, DomainError> {
        match name.to_lowercase().as_str() {
            "inmem" | "memory" => Ok(BackendConfig::Memory),
            "redb" => Ok(BackendConfig::Redb { path }),
            "rocksdb" | "rocks" => Ok(BackendConfig::Rocks { path }),
            "sqlite" => Ok(BackendConfig::Sqlite { path }),
            "redis" => {
                redis.validate()?;
                Ok(BackendConfig::Redis(redis))
            }
            other => Err(DomainError::Config(format!(
                "unsupported database type: {other} (expected inmem, redb, rocksdb, sqlite or redis)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "inmem",
            BackendConfig::Redb { .. } => "redb",
            BackendConfig::Rocks { .. } => "rocksdb",
            BackendConfig::Sqlite { .. } => "sqlite",
            BackendConfig::Redis(_) => "redis",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub index_path: PathBuf,
    /// `None` lets the first insert fix the dimensionality.
    pub dimension: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            dimension: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Parser worker count.
    pub parallelism: usize,
    /// Index-build worker count handed to the engine at completion.
    pub pool_size: usize,
    pub kv_delimiter: String,
    pub value_delimiter: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let cpus = available_cpus();
        Self {
            parallelism: cpus,
            pool_size: cpus,
            kv_delimiter: "\t".into(),
            value_delimiter: " ".into(),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.parallelism == 0 {
            return Err(DomainError::Config("parallel parse size must be at least 1".into()));
        }
        if self.pool_size == 0 {
            return Err(DomainError::Config("index pool size must be at least 1".into()));
        }
        if self.kv_delimiter.is_empty() || self.value_delimiter.is_empty() {
            return Err(DomainError::Config("text delimiters must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: BackendConfig,
    pub engine: EngineConfig,
}

pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parses a `--redis-database-index` style pair; an empty list means `0,1`.
pub fn redis_namespaces(indexes: &[i64]) -> Result<(i64, i64), DomainError> {
    match indexes {
        [] => Ok((0, 1)),
        [kv, vk] => Ok((*kv, *vk)),
        other => Err(DomainError::Config(format!(
            "expected exactly 2 redis database indexes, got {}",
            other.len()
        ))),
    }
}
