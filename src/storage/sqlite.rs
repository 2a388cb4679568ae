//! SQLite-backed key/value state

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{AdError, Result};
use crate::storage::migrations;

use super::KeyValueStore;

/// Integer key/value store on top of a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    schema_version: u32,
}

impl SqliteStore {
    /// Open (or create) the state database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::configure_pragmas(&conn)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let schema_version = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            schema_version,
        })
    }

    /// Current schema version after migrations.
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Every stored entry, ordered by key.
    pub fn entries(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM kv ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.lock().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get_int(&self, key: &str, default: i32) -> Result<i32> {
        match self.read(key)? {
            Some(value) => i32::try_from(value)
                .map_err(|_| AdError::Storage(format!("value for {key} does not fit in an int: {value}"))),
            None => Ok(default),
        }
    }

    fn put_int(&self, key: &str, value: i32) -> Result<()> {
        self.write(key, i64::from(value))
    }

    fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self.read(key)?.unwrap_or(default))
    }

    fn put_long(&self, key: &str, value: i64) -> Result<()> {
        self.write(key, value)
    }
}
