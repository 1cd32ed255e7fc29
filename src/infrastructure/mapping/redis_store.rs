//! Remote mapping store on a redis server.
//!
//! The two tables live in two logical databases of the same server: `kv_db`
//! holds id -> handle and `vk_db` holds handle -> id. Every request starts
//! with a `SELECT` of the right database. Writes WATCH the keys they read and
//! commit both tables in one MULTI/EXEC, retrying when another client got
//! there first.

use crate::domain::error::DomainError;
use crate::domain::ports::mapping_store::MappingStore;
use crate::domain::values::external_id::display_id;
use crate::domain::values::handle::{decode_handle, encode_handle, Handle};
use redis::{Client, Connection};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MAX_WATCH_RETRIES: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct RedisOptions {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database for the id -> handle table.
    pub kv_db: i64,
    /// Logical database for the handle -> id table.
    pub vk_db: i64,
    /// How long to keep retrying PING while the server loads its dataset.
    pub ping_timeout: Duration,
    pub ping_retry_freq: Duration,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            password: None,
            kv_db: 0,
            vk_db: 1,
            ping_timeout: Duration::from_secs(600),
            ping_retry_freq: Duration::from_secs(10),
        }
    }
}

impl RedisOptions {
    pub fn url(&self) -> String {
        match &self.password {
            Some(pass) if !pass.is_empty() => format!("redis://:{pass}@{}:{}/", self.host, self.port),
            _ => format!("redis://{}:{}/", self.host, self.port),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.kv_db == self.vk_db {
            return Err(DomainError::Config(format!(
                "redis kv and vk databases must be different ({}, {})",
                self.kv_db, self.vk_db
            )));
        }
        if self.ping_timeout.is_zero() {
            return Err(DomainError::Config("redis ping timeout must be greater than 0".into()));
        }
        if self.ping_retry_freq.is_zero() {
            return Err(DomainError::Config("redis ping retry frequency must be greater than 0".into()));
        }
        Ok(())
    }
}

fn redis_err(e: redis::RedisError) -> DomainError {
    DomainError::BackendUnavailable(format!("redis: {e}"))
}

pub struct RedisMappingStore {
    conn: Mutex<Option<Connection>>,
    kv_db: i64,
    vk_db: i64,
}

impl RedisMappingStore {
    /// Connects and waits for the server to answer PING, retrying every
    /// `ping_retry_freq` until `ping_timeout` has elapsed.
    pub fn connect(options: &RedisOptions) -> Result<Self, DomainError> {
        options.validate()?;
        let client = Client::open(options.url()).map_err(redis_err)?;
        let deadline = Instant::now() + options.ping_timeout;

        let conn = loop {
            let attempt = client.get_connection().and_then(|mut conn| {
                redis::cmd("PING").query::<String>(&mut conn)?;
                Ok(conn)
            });
            match attempt {
                Ok(conn) => break conn,
                Err(e) if Instant::now() + options.ping_retry_freq < deadline => {
                    warn!(host = %options.host, port = options.port, error = %e, "redis not ready, retrying");
                    std::thread::sleep(options.ping_retry_freq);
                }
                Err(e) => return Err(redis_err(e)),
            }
        };
        info!(host = %options.host, port = options.port, kv_db = options.kv_db, vk_db = options.vk_db, "connected to redis");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            kv_db: options.kv_db,
            vk_db: options.vk_db,
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
            .ok_or_else(|| DomainError::BackendUnavailable("redis store is closed".into()))?;
        f(conn)
    }

    /// Runs a WATCH / read / MULTI-EXEC attempt until EXEC commits, so a
    /// concurrent writer between the reads and the write forces a retry.
    /// `attempt` returns `Ok(false)` when EXEC was aborted.
    fn optimistic(
        conn: &mut Connection,
        operation: &'static str,
        mut attempt: impl FnMut(&mut Connection) -> Result<bool, DomainError>,
    ) -> Result<(), DomainError> {
        for retry in 0..MAX_WATCH_RETRIES {
            match attempt(conn) {
                Ok(true) => return Ok(()),
                Ok(false) => debug!(operation, retry, "redis transaction raced, retrying"),
                Err(e) => {
                    if let Err(unwatch) = redis::cmd("UNWATCH").query::<()>(conn) {
                        warn!(operation, error = %unwatch, "redis UNWATCH failed");
                    }
                    return Err(e);
                }
            }
        }
        Err(DomainError::BackendUnavailable(format!(
            "redis {operation} kept racing with other writers"
        )))
    }

    fn watch(conn: &mut Connection, db: i64, key: &[u8]) -> Result<(), DomainError> {
        redis::cmd("SELECT").arg(db).query::<()>(conn).map_err(redis_err)?;
        redis::cmd("WATCH").arg(key).query::<()>(conn).map_err(redis_err)
    }

    /// Plain read for use between WATCH and EXEC, where a MULTI block would
    /// drop the watches.
    fn get_watched(conn: &mut Connection, db: i64, key: &[u8]) -> Result<Option<Vec<u8>>, DomainError> {
        redis::cmd("SELECT").arg(db).query::<()>(conn).map_err(redis_err)?;
        redis::cmd("GET").arg(key).query(conn).map_err(redis_err)
    }

    /// `true` if EXEC committed, `false` if a watched key changed.
    fn exec(conn: &mut Connection, pipe: &redis::Pipeline) -> Result<bool, DomainError> {
        let committed: Option<()> = pipe.query(conn).map_err(redis_err)?;
        Ok(committed.is_some())
    }

    fn get_in(conn: &mut Connection, db: i64, key: &[u8]) -> Result<Option<Vec<u8>>, DomainError> {
        let (value,): (Option<Vec<u8>>,) = redis::pipe()
            .atomic()
            .cmd("SELECT").arg(db).ignore()
            .cmd("GET").arg(key)
            .query(conn)
            .map_err(redis_err)?;
        Ok(value)
    }
}

impl MappingStore for RedisMappingStore {
    fn name(&self) -> &str {
        "redis"
    }

    fn get_handle(&self, id: &[u8]) -> Result<Handle, DomainError> {
        self.with_conn(|conn| {
            let raw = Self::get_in(conn, self.kv_db, id)?
                .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))?;
            decode_handle(&raw)
        })
    }

    fn get_id(&self, handle: Handle) -> Result<Vec<u8>, DomainError> {
        self.with_conn(|conn| {
            Self::get_in(conn, self.vk_db, &encode_handle(handle))?
                .ok_or_else(|| DomainError::NotFound(format!("handle {handle}")))
        })
    }

    fn get_ids(&self, handles: &[Handle]) -> Result<Vec<Vec<u8>>, DomainError> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<Vec<u8>> = handles.iter().map(|h| encode_handle(*h).to_vec()).collect();
        self.with_conn(|conn| {
            let (values,): (Vec<Option<Vec<u8>>>,) = redis::pipe()
                .atomic()
                .cmd("SELECT").arg(self.vk_db).ignore()
                .cmd("MGET").arg(&keys)
                .query(conn)
                .map_err(redis_err)?;
            values
                .into_iter()
                .zip(handles)
                .map(|(v, h)| v.ok_or_else(|| DomainError::NotFound(format!("handle {h}"))))
                .collect()
        })
    }

    fn set(&self, id: &[u8], handle: Handle) -> Result<(), DomainError> {
        let encoded = encode_handle(handle);
        self.with_conn(|conn| {
            Self::optimistic(conn, "set", |conn| {
                Self::watch(conn, self.kv_db, id)?;
                Self::watch(conn, self.vk_db, &encoded)?;
                if let Some(owner) = Self::get_watched(conn, self.vk_db, &encoded)? {
                    if owner != id {
                        return Err(DomainError::Conflict(format!(
                            "handle {handle} already bound to {}",
                            display_id(&owner)
                        )));
                    }
                }
                let previous = Self::get_watched(conn, self.kv_db, id)?;

                let mut pipe = redis::pipe();
                pipe.atomic()
                    .cmd("SELECT").arg(self.kv_db).ignore()
                    .cmd("SET").arg(id).arg(&encoded[..]).ignore()
                    .cmd("SELECT").arg(self.vk_db).ignore();
                if let Some(previous) = previous {
                    if previous.as_slice() != encoded.as_slice() {
                        pipe.cmd("DEL").arg(previous).ignore();
                    }
                }
                pipe.cmd("SET").arg(&encoded[..]).arg(id).ignore();
                Self::exec(conn, &pipe)
            })
        })
    }

    fn delete(&self, id: &[u8]) -> Result<(), DomainError> {
        self.with_conn(|conn| {
            Self::optimistic(conn, "delete", |conn| {
                Self::watch(conn, self.kv_db, id)?;
                let raw = Self::get_watched(conn, self.kv_db, id)?
                    .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))?;
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .cmd("SELECT").arg(self.kv_db).ignore()
                    .cmd("DEL").arg(id).ignore()
                    .cmd("SELECT").arg(self.vk_db).ignore()
                    .cmd("DEL").arg(raw).ignore();
                Self::exec(conn, &pipe)
            })
        })
    }

    fn close(&self) -> Result<(), DomainError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DomainError::BackendUnavailable(e.to_string()))?;
        guard.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_namespaces_rejected() {
        let options = RedisOptions {
            kv_db: 3,
            vk_db: 3,
            ..RedisOptions::default()
        };
        let err = RedisMappingStore::connect(&options).err().unwrap();
        assert!(matches!(err, DomainError::Config(_)));
    }

    #[test]
    fn test_url_with_password() {
        let options = RedisOptions {
            password: Some("secret".into()),
            ..RedisOptions::default()
        };
        assert_eq!(options.url(), "redis://:secret@localhost:6379/");
        assert_eq!(RedisOptions::default().url(), "redis://localhost:6379/");
    }
}
