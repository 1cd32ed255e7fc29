pub mod mapping_store;
pub mod migrations;
