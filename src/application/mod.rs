pub mod ingest;
pub mod service;
