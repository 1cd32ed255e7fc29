pub mod engine;
pub mod mapping;
pub mod sqlite;
pub mod text;
