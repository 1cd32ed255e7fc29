pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

use crate::application::ingest::{IngestPipeline, IngestReport};
use crate::application::service::VectorService;
use crate::config::{IngestConfig, Settings};
use crate::domain::error::DomainError;
use crate::domain::ports::vector_engine::VectorEngine;
use crate::infrastructure::engine::flat::FlatIndex;
use crate::infrastructure::mapping::open_mapping_store;
use crate::infrastructure::text::parser::TextParser;
use crate::infrastructure::text::reader::TextReader;
use std::path::Path;
use std::sync::Arc;

/// Builds the service once at startup; transports receive the returned handle.
pub fn open_service(settings: &Settings) -> Result<Arc<VectorService>, DomainError> {
    let engine: Arc<dyn VectorEngine> = Arc::new(FlatIndex::open(
        &settings.engine.index_path,
        settings.engine.dimension,
    )?);
    let store = open_mapping_store(&settings.backend)?;
    Ok(Arc::new(VectorService::new(engine, store)))
}

/// Bulk-loads a delimited text file into `service`.
pub async fn ingest_text_file(
    service: Arc<VectorService>,
    input: &Path,
    config: &IngestConfig,
) -> Result<IngestReport, DomainError> {
    let reader = TextReader::open(input)?;
    let parser = TextParser::new(config.kv_delimiter.clone(), config.value_delimiter.clone())?;
    IngestPipeline::new(service, Box::new(reader), Arc::new(parser), config)?
        .run()
        .await
}
