pub mod mapping_store;
pub mod record_source;
pub mod vector_engine;
