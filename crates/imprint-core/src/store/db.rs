//! Shared SQLite database
//!
//! One database file backs the warm tier, profile persistence, and
//! governance tables. Separate reader/writer connections give interior
//! mutability: all consumers take `&self`, so the whole store tree is
//! `Send + Sync` behind an `Arc`.

use crate::error::StoreError;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// Shared database handle
pub struct Database {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and apply migrations
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)?;
        Self::configure_connection(&writer)?;
        Self::apply_migrations(&writer)?;

        let reader = Connection::open(path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// In-memory database for tests
    ///
    /// Uses a uniquely-named shared-cache memory database so the reader
    /// and writer connections see the same data.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        use rusqlite::OpenFlags;

        let uri = format!(
            "file:imprint-mem-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;

        let writer = Connection::open_with_flags(&uri, flags)?;
        Self::configure_memory_connection(&writer)?;
        Self::apply_migrations(&writer)?;

        let reader = Connection::open_with_flags(&uri, flags)?;
        Self::configure_memory_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn configure_memory_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }

    /// Apply pending migrations in order
    fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let current: u32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        for migration in super::migrations::MIGRATIONS {
            if migration.version <= current {
                continue;
            }
            tracing::info!(
                version = migration.version,
                "applying migration: {}",
                migration.description
            );
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, Utc::now().to_rfc3339()],
            )?;
        }
        Ok(())
    }

    /// Run a closure against the writer connection
    pub fn with_writer<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self
            .writer
            .lock()
            .map_err(|_| StoreError::Unavailable("writer lock poisoned".into()))?;
        f(&conn)
    }

    /// Run a closure against the reader connection
    pub fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self
            .reader
            .lock()
            .map_err(|_| StoreError::Unavailable("reader lock poisoned".into()))?;
        f(&conn)
    }

    /// Run a closure inside a writer transaction; rolls back on error
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self
            .writer
            .lock()
            .map_err(|_| StoreError::Unavailable("writer lock poisoned".into()))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
