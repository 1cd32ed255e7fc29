use crate::domain::error::DomainError;
use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> Result<(), DomainError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kvs (
            key BLOB NOT NULL PRIMARY KEY,
            val INTEGER NOT NULL UNIQUE
        );
        "
    ).map_err(|e| DomainError::BackendUnavailable(format!("Migration failed: {e}")))
}
