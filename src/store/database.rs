//! SQLite backend keeping every saved revision.
//!
//! Each persist inserts a new row and moves the `active` marker to it inside
//! one transaction; at most one row is active at a time. Auxiliary files are
//! kept in a second table keyed by name.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::config::loader::marshal_config;
use crate::config::schema::SQL_DRIVER_SQLITE;
use crate::config::{Codec, Config};
use crate::error::PersistenceError;
use crate::store::backend::Backend;

/// Largest value written to either table, in bytes.
pub const DEFAULT_MAX_WRITE_LENGTH: usize = 4 * 1024 * 1024;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    Path(PathBuf),
}

pub struct DatabaseBackend {
    conn: Mutex<Connection>,
    target: SqliteTarget,
    max_write_length: usize,
}

impl DatabaseBackend {
    pub fn open(
        target: SqliteTarget,
        max_write_length: usize,
        busy_timeout: Duration,
    ) -> Result<Self, PersistenceError> {
        let conn = match &target {
            SqliteTarget::Memory => Connection::open_in_memory()?,
            SqliteTarget::Path(path) => Connection::open(path)?,
        };
        conn.busy_timeout(busy_timeout)?;

        let backend = Self {
            conn: Mutex::new(conn),
            target,
            max_write_length,
        };
        backend.ensure_schema()?;
        Ok(backend)
    }

    fn ensure_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS configurations (
                id TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                create_at INTEGER NOT NULL,
                active INTEGER NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS configuration_files (
                name TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                create_at INTEGER NOT NULL,
                update_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    fn check_length(&self, actual: usize) -> Result<(), PersistenceError> {
        if actual > self.max_write_length {
            return Err(PersistenceError::TooLarge {
                limit: self.max_write_length,
                actual,
            });
        }
        Ok(())
    }

    /// Id of the active revision.
    pub fn active_id(&self) -> Result<Option<String>, PersistenceError> {
        let conn = self.conn.lock();
        let id = conn
            .query_row("SELECT id FROM configurations WHERE active", [], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// Number of stored revisions, active or not.
    pub fn revision_count(&self) -> Result<usize, PersistenceError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM configurations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl Backend for DatabaseBackend {
    fn describe(&self) -> String {
        match &self.target {
            SqliteTarget::Memory => "sqlite::memory:".to_string(),
            SqliteTarget::Path(path) => format!("sqlite://{}", path.display()),
        }
    }

    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row("SELECT value FROM configurations WHERE active", [], |row| row.get(0))
            .optional()?;
        Ok(value.map(String::into_bytes))
    }

    fn persist(&self, config: &Config) -> Result<Vec<u8>, PersistenceError> {
        let bytes = marshal_config(config, Codec::Json)?;
        let value = std::str::from_utf8(&bytes).map_err(|e| PersistenceError::Encode(e.into()))?;
        self.check_length(value.len())?;

        let mut conn = self.conn.lock();
        let current: Option<String> = conn
            .query_row("SELECT value FROM configurations WHERE active", [], |row| row.get(0))
            .optional()?;
        if current.as_deref() == Some(value) {
            tracing::debug!("Database configuration unchanged, skipping write");
            return Ok(bytes);
        }

        let tx = conn.transaction()?;
        tx.execute("UPDATE configurations SET active = NULL WHERE active", [])?;
        tx.execute(
            "INSERT INTO configurations (id, value, create_at, active) VALUES (?1, ?2, ?3, 1)",
            params![Uuid::new_v4().simple().to_string(), value, now_millis()],
        )?;
        tx.commit()?;
        Ok(bytes)
    }

    /// Defaults with the application database pointing at this one.
    fn initial_config(&self) -> Config {
        let mut config = Config::default();
        if let SqliteTarget::Path(path) = &self.target {
            config.sql_settings.driver_name = SQL_DRIVER_SQLITE.to_string();
            config.sql_settings.data_source = Some(path.display().to_string());
        }
        config.set_defaults();
        config
    }

    fn get_file(&self, name: &str) -> Result<Vec<u8>, PersistenceError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT data FROM configuration_files WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| PersistenceError::FileNotFound(name.to_string()))
    }

    fn set_file(&self, name: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.check_length(data.len())?;
        let now = now_millis();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO configuration_files (name, data, create_at, update_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(name) DO UPDATE
             SET data = excluded.data, update_at = excluded.update_at",
            params![name, data, now],
        )?;
        Ok(())
    }

    fn has_file(&self, name: &str) -> Result<bool, PersistenceError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM configuration_files WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn remove_file(&self, name: &str) -> Result<(), PersistenceError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM configuration_files WHERE name = ?1", params![name])?;
        Ok(())
    }
}
