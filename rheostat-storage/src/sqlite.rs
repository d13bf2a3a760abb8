//! SQLite-backed param repository.
//!
//! Rows live in one table (`engine_params` by default):
//!
//! | column | type |
//! |---|---|
//! | `name` | TEXT NOT NULL, part of PK |
//! | `value` | TEXT NULL |
//! | `category` | TEXT NOT NULL, part of PK |
//! | `created_at` | INTEGER NOT NULL, epoch seconds |
//! | `updated_at` | INTEGER NOT NULL, epoch seconds |
//!
//! A companion `{table}_versions` table keeps the write watermark of each
//! category. Every write bumps it inside the same transaction, so a reader
//! can never see new rows with an old watermark.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rheostat_core::{ConfigError, RawRow, StorageError, StorageResult, Watermark};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Deserialize;

use crate::{ChangeJournal, ParamRepository};

/// Default table name.
pub const DEFAULT_TABLE: &str = "engine_params";

/// Default busy timeout for SQLite connections.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

/// Configuration for [`SqliteRepository`].
///
/// # Invariants
/// - `table` is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Table holding the param rows.
    #[serde(default = "default_table")]
    pub table: String,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: default_table(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut chars = self.table.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ConfigError::InvalidValue {
                field: "table".to_string(),
                value: self.table.clone(),
                reason: "table must be a plain SQL identifier".to_string(),
            });
        }
        Ok(())
    }
}

/// Errors raised while opening a [`SqliteRepository`].
#[derive(Debug, thiserror::Error)]
pub enum SqliteRepositoryError {
    #[error("Invalid SQLite configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("SQLite error: {0}")]
    Db(String),
}

impl From<SqliteRepositoryError> for StorageError {
    fn from(e: SqliteRepositoryError) -> Self {
        StorageError::TransactionFailed {
            reason: e.to_string(),
        }
    }
}

/// Repository storing active params in SQLite.
///
/// One connection guarded by a mutex; every call holds it for the duration
/// of its statement or transaction.
pub struct SqliteRepository {
    connection: Mutex<Connection>,
    table: String,
    versions_table: String,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open (or create) the database described by `config`.
    pub fn open(config: &SqliteConfig) -> Result<Self, SqliteRepositoryError> {
        config.validate()?;
        let connection = open_connection(&config.path, config.busy_timeout_ms)?;
        Self::with_connection(connection, &config.table)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, SqliteRepositoryError> {
        let connection =
            Connection::open_in_memory().map_err(|e| SqliteRepositoryError::Db(e.to_string()))?;
        Self::with_connection(connection, DEFAULT_TABLE)
    }

    fn with_connection(connection: Connection, table: &str) -> Result<Self, SqliteRepositoryError> {
        let repo = Self {
            connection: Mutex::new(connection),
            table: table.to_string(),
            versions_table: format!("{table}_versions"),
        };
        repo.initialize_schema()?;
        tracing::debug!(table = %repo.table, "SQLite repository ready");
        Ok(repo)
    }

    /// Name of the rows table.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn initialize_schema(&self) -> Result<(), SqliteRepositoryError> {
        let table = &self.table;
        let versions = &self.versions_table;
        let guard = self
            .connection
            .lock()
            .map_err(|_| SqliteRepositoryError::Db("connection lock poisoned".to_string()))?;
        guard
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    name TEXT NOT NULL,
                    value TEXT NULL,
                    category TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (name, category)
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_category ON {table} (category);
                CREATE INDEX IF NOT EXISTS idx_{table}_category_updated
                    ON {table} (category, updated_at);
                CREATE TABLE IF NOT EXISTS {versions} (
                    category TEXT NOT NULL PRIMARY KEY,
                    version INTEGER NOT NULL
                );"
            ))
            .map_err(|e| SqliteRepositoryError::Db(e.to_string()))
    }

    fn bump_sql(&self) -> String {
        format!(
            "INSERT INTO {} (category, version) VALUES (?1, 1)
             ON CONFLICT(category) DO UPDATE SET version = version + 1",
            self.versions_table
        )
    }
}

/// Opens a SQLite connection with the busy timeout applied.
fn open_connection(path: &Path, busy_timeout_ms: u64) -> Result<Connection, SqliteRepositoryError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags)
        .map_err(|e| SqliteRepositoryError::Db(e.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(busy_timeout_ms))
        .map_err(|e| SqliteRepositoryError::Db(e.to_string()))?;
    connection
        .execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(|e| SqliteRepositoryError::Db(e.to_string()))?;
    Ok(connection)
}

fn tx_failed(e: rusqlite::Error) -> StorageError {
    StorageError::TransactionFailed {
        reason: e.to_string(),
    }
}

impl ChangeJournal for SqliteRepository {
    fn current_watermark(&self, category: &str) -> StorageResult<Watermark> {
        let guard = self.lock()?;
        let version: Option<i64> = guard
            .query_row(
                &format!("SELECT version FROM {} WHERE category = ?1", self.versions_table),
                params![category],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::QueryFailed {
                category: category.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Watermark::new(version.unwrap_or(0).max(0) as u64))
    }
}

impl ParamRepository for SqliteRepository {
    fn find_by_category(&self, category: &str) -> StorageResult<Vec<RawRow>> {
        let query_failed = |e: rusqlite::Error| StorageError::QueryFailed {
            category: category.to_string(),
            reason: e.to_string(),
        };

        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(&format!(
                "SELECT name, value, category, created_at, updated_at
                 FROM {} WHERE category = ?1 ORDER BY name ASC",
                self.table
            ))
            .map_err(query_failed)?;

        let rows = stmt
            .query_map(params![category], |row| {
                Ok(RawRow {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    category: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })
            .map_err(query_failed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_failed)?;
        Ok(rows)
    }

    fn insert(&self, row: &RawRow) -> StorageResult<()> {
        let insert_failed = |e: rusqlite::Error| StorageError::InsertFailed {
            name: row.name.clone(),
            category: row.category.clone(),
            reason: e.to_string(),
        };

        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(tx_failed)?;
        tx.execute(
            &format!(
                "INSERT INTO {} (name, value, category, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                self.table
            ),
            params![row.name, row.value, row.category, row.created_at, row.updated_at],
        )
        .map_err(insert_failed)?;
        tx.execute(&self.bump_sql(), params![row.category])
            .map_err(insert_failed)?;
        tx.commit().map_err(tx_failed)
    }

    fn update(&self, row: &RawRow) -> StorageResult<()> {
        let update_failed = |reason: String| StorageError::UpdateFailed {
            name: row.name.clone(),
            category: row.category.clone(),
            reason,
        };

        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(tx_failed)?;
        let changed = tx
            .execute(
                &format!(
                    "UPDATE {} SET value = ?1, updated_at = ?2 WHERE name = ?3 AND category = ?4",
                    self.table
                ),
                params![row.value, row.updated_at, row.name, row.category],
            )
            .map_err(|e| update_failed(e.to_string()))?;
        if changed == 0 {
            // Dropping the transaction rolls it back
            return Err(update_failed("no matching row".to_string()));
        }
        tx.execute(&self.bump_sql(), params![row.category])
            .map_err(|e| update_failed(e.to_string()))?;
        tx.commit().map_err(tx_failed)
    }

    fn delete_by_category(&self, category: &str) -> StorageResult<u64> {
        let delete_failed = |e: rusqlite::Error| StorageError::DeleteFailed {
            category: category.to_string(),
            reason: e.to_string(),
        };

        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(tx_failed)?;
        let removed = tx
            .execute(
                &format!("DELETE FROM {} WHERE category = ?1", self.table),
                params![category],
            )
            .map_err(delete_failed)?;
        if removed > 0 {
            tx.execute(&self.bump_sql(), params![category])
                .map_err(delete_failed)?;
        }
        tx.commit().map_err(tx_failed)?;
        Ok(removed as u64)
    }
}
