use crate::application::service::DEFAULT_EPSILON;
use crate::config::{
    available_cpus, redis_namespaces, BackendConfig, EngineConfig, IngestConfig, Settings,
    DEFAULT_DB_PATH, DEFAULT_INDEX_PATH,
};
use crate::domain::error::DomainError;
use crate::infrastructure::mapping::redis_store::RedisOptions;
use crate::infrastructure::text::parser::parse_value;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "vecbridge", about = "External ids in front of a vector index")]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct StoreArgs {
    /// Path to the index directory
    #[arg(short, long, global = true, env = "VECBRIDGE_INDEX", default_value = DEFAULT_INDEX_PATH)]
    pub index: PathBuf,
    /// Vector dimensionality (required when creating a new index with a fixed size)
    #[arg(short, long, global = true, env = "VECBRIDGE_DIMENSION")]
    pub dimension: Option<usize>,
    /// Mapping store backend (inmem, redb, rocksdb, sqlite, redis)
    #[arg(short = 't', long, global = true, env = "VECBRIDGE_DB_TYPE", default_value = "sqlite")]
    pub database_type: String,
    /// Mapping store path (redb, rocksdb, sqlite)
    #[arg(short = 'p', long, global = true, env = "VECBRIDGE_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub database_path: PathBuf,
    #[arg(long, global = true, env = "VECBRIDGE_REDIS_HOST", default_value = "localhost")]
    pub redis_host: String,
    #[arg(long, global = true, env = "VECBRIDGE_REDIS_PORT", default_value = "6379")]
    pub redis_port: u16,
    #[arg(long, global = true, env = "VECBRIDGE_REDIS_PASSWORD")]
    pub redis_password: Option<String>,
    /// Two redis database indexes: id->handle, handle->id
    #[arg(short = 'I', long, global = true, value_delimiter = ',')]
    pub redis_database_index: Vec<i64>,
    /// Seconds to wait for redis to finish loading before giving up
    #[arg(long, global = true, default_value = "600")]
    pub redis_ping_timeout: u64,
    /// Seconds between redis PING attempts
    #[arg(long, global = true, default_value = "10")]
    pub redis_ping_retry_freq: u64,
}

impl StoreArgs {
    pub fn settings(&self) -> Result<Settings, DomainError> {
        let (kv_db, vk_db) = redis_namespaces(&self.redis_database_index)?;
        let redis = RedisOptions {
            host: self.redis_host.clone(),
            port: self.redis_port,
            password: self.redis_password.clone(),
            kv_db,
            vk_db,
            ping_timeout: Duration::from_secs(self.redis_ping_timeout),
            ping_retry_freq: Duration::from_secs(self.redis_ping_retry_freq),
        };
        Ok(Settings {
            backend: BackendConfig::from_name(&self.database_type, self.database_path.clone(), redis)?,
            engine: EngineConfig {
                index_path: self.index.clone(),
                dimension: self.dimension.filter(|d| *d > 0),
            },
        })
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bulk-load a delimited text file (one `id<TAB>v1 v2 ...` record per line)
    Build {
        input: PathBuf,
        /// Key/value delimiter followed by value delimiter
        #[arg(short = 'D', long, num_args = 2, default_values_t = ["\t".to_string(), " ".to_string()])]
        text_delimiter: Vec<String>,
        /// Index-build workers
        #[arg(long, default_value_t = available_cpus())]
        pool: usize,
        /// Parser workers
        #[arg(long, default_value_t = available_cpus())]
        parallel_parse: usize,
    },
    /// Nearest neighbours of a vector
    Search {
        /// Components separated by spaces or commas; `0x` hex bit patterns allowed
        vector: String,
        #[arg(long, default_value = "10")]
        size: usize,
        #[arg(long, default_value_t = DEFAULT_EPSILON)]
        epsilon: f32,
    },
    /// Nearest neighbours of the vector stored under an id
    SearchId {
        id: String,
        #[arg(long, default_value = "10")]
        size: usize,
        #[arg(long, default_value_t = DEFAULT_EPSILON)]
        epsilon: f32,
    },
    /// Insert one vector
    Insert {
        id: String,
        vector: String,
    },
    /// Remove one or more ids
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print stored vectors
    Get {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print the index dimensionality
    Dimension,
}

impl Commands {
    pub fn ingest_config(&self) -> Option<IngestConfig> {
        match self {
            Commands::Build {
                text_delimiter,
                pool,
                parallel_parse,
                ..
            } => Some(IngestConfig {
                parallelism: *parallel_parse,
                pool_size: *pool,
                kv_delimiter: text_delimiter.first().cloned().unwrap_or_else(|| "\t".into()),
                value_delimiter: text_delimiter.get(1).cloned().unwrap_or_else(|| " ".into()),
            }),
            _ => None,
        }
    }
}

/// Parses a command-line vector: components split on whitespace or commas.
pub fn parse_vector(text: &str) -> Result<Vec<f64>, DomainError> {
    let vector = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(parse_value)
        .collect::<Result<Vec<f64>, _>>()?;
    if vector.is_empty() {
        return Err(DomainError::InvalidInput("vector must not be empty".into()));
    }
    Ok(vector)
}
