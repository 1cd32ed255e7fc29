use crate::domain::error::DomainError;
use crate::domain::ports::mapping_store::MappingStore;
use crate::domain::values::external_id::display_id;
use crate::domain::values::handle::Handle;
use crate::infrastructure::sqlite::migrations::run_migrations;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

/// Relational mapping store: one `kvs` table whose primary key is the
/// external id and whose `val` column carries a UNIQUE handle, so the
/// database itself enforces the bijection.
pub struct SqliteMappingStore {
    conn: Mutex<Option<Connection>>,
}

fn db_err(e: rusqlite::Error) -> DomainError {
    DomainError::BackendUnavailable(format!("sqlite: {e}"))
}

impl SqliteMappingStore {
    pub fn open(path: &str) -> Result<Self, DomainError> {
        let conn = Connection::open(path).map_err(|e| DomainError::BackendUnavailable(format!("DB error: {e}")))?;
        if path != ":memory:" {
            conn.pragma_update(None, "journal_mode", "WAL").map_err(|e| DomainError::BackendUnavailable(format!("WAL error: {e}")))?;
        }
        Self::new(conn)
    }

    pub fn new(conn: Connection) -> Result<Self, DomainError> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DomainError::BackendUnavailable(e.to_string()))?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| DomainError::BackendUnavailable("sqlite store is closed".into()))?;
        f(conn)
    }

    fn lookup_id(conn: &Connection, handle: Handle) -> Result<Option<Vec<u8>>, DomainError> {
        conn.prepare_cached("SELECT key FROM kvs WHERE val = ?1 LIMIT 1")
            .map_err(db_err)?
            .query_row(params![handle], |r| r.get(0))
            .optional()
            .map_err(db_err)
    }
}

impl MappingStore for SqliteMappingStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn get_handle(&self, id: &[u8]) -> Result<Handle, DomainError> {
        self.with_conn(|conn| {
            conn.prepare_cached("SELECT val FROM kvs WHERE key = ?1 LIMIT 1")
                .map_err(db_err)?
                .query_row(params![id], |r| r.get(0))
                .optional()
                .map_err(db_err)?
                .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))
        })
    }

    fn get_id(&self, handle: Handle) -> Result<Vec<u8>, DomainError> {
        self.with_conn(|conn| {
            Self::lookup_id(conn, handle)?
                .ok_or_else(|| DomainError::NotFound(format!("handle {handle}")))
        })
    }

    fn get_ids(&self, handles: &[Handle]) -> Result<Vec<Vec<u8>>, DomainError> {
        self.with_conn(|conn| {
            handles
                .iter()
                .map(|h| {
                    Self::lookup_id(conn, *h)?
                        .ok_or_else(|| DomainError::NotFound(format!("handle {h}")))
                })
                .collect()
        })
    }

    fn set(&self, id: &[u8], handle: Handle) -> Result<(), DomainError> {
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(db_err)?;
            if let Some(owner) = Self::lookup_id(&tx, handle)? {
                if owner != id {
                    return Err(DomainError::Conflict(format!(
                        "handle {handle} already bound to {}",
                        display_id(&owner)
                    )));
                }
            }
            tx.execute(
                "INSERT INTO kvs (key, val) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET val = excluded.val",
                params![id, handle],
            )
            .map_err(|e| DomainError::BackendUnavailable(format!("Failed to set mapping: {e}")))?;
            tx.commit().map_err(db_err)
        })
    }

    fn delete(&self, id: &[u8]) -> Result<(), DomainError> {
        self.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM kvs WHERE key = ?1", params![id])
                .map_err(|e| DomainError::BackendUnavailable(format!("Failed to delete mapping: {e}")))?;
            if removed == 0 {
                return Err(DomainError::NotFound(format!("id {}", display_id(id))));
            }
            Ok(())
        })
    }

    fn close(&self) -> Result<(), DomainError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DomainError::BackendUnavailable(e.to_string()))?;
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, e)| db_err(e)),
            None => Ok(()),
        }
    }
}
