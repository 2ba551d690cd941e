//! Connection provisioning for the member store.
//!
//! # Responsibility
//! - Own the live SQLite connection and its lazy, idempotent initialization.
//! - Lend scoped connection access and execute parametrized mutations.
//!
//! # Invariants
//! - `initialize` opens and migrates the database at most once per provider.
//! - Connection borrows are released on every exit path (lock guard scope).
//! - Operations before `initialize` fail with `DbError::NotInitialized`.

use super::open::open_location;
use super::{DbError, DbResult};
use log::{debug, info};
use once_cell::sync::OnceCell;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum DatabaseLocation {
    /// Database file on disk, created when missing.
    File(PathBuf),
    /// Private in-memory database, discarded with the provider.
    Memory,
}

/// Backend seam used by `MemberStore`.
///
/// Implementations are injected at store construction so tests can wrap or
/// replace the backend.
pub trait ConnectionProvider {
    /// Returns whether a migrated connection is available.
    fn is_ready(&self) -> bool;

    /// Opens and migrates the backend. Repeated calls are no-ops.
    fn initialize(&self) -> DbResult<()>;

    /// Runs `f` with exclusive access to the live connection.
    fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<DbError>;

    /// Executes one parametrized mutating statement and returns affected rows.
    fn execute_update(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        self.with_connection(|conn| -> DbResult<usize> {
            Ok(conn.execute(sql, params_from_iter(params.iter()))?)
        })
    }

    /// Empties `table` and resets its AUTOINCREMENT sequence in one step.
    ///
    /// `table` must be a trusted identifier; it is interpolated into SQL.
    fn truncate_table(&self, table: &str) -> DbResult<()> {
        self.with_connection(|conn| -> DbResult<()> {
            let tx = conn.transaction()?;
            tx.execute(&format!("DELETE FROM {table};"), [])?;
            tx.execute("DELETE FROM sqlite_sequence WHERE name = ?1;", [table])?;
            tx.commit()?;
            Ok(())
        })
    }
}

/// SQLite-backed provider holding one lazily opened connection.
pub struct SqliteConnectionProvider {
    location: DatabaseLocation,
    busy_timeout: Duration,
    conn: OnceCell<Mutex<Connection>>,
}

impl SqliteConnectionProvider {
    /// Creates an uninitialized provider; nothing is opened until `initialize`.
    pub fn new(location: DatabaseLocation, busy_timeout: Duration) -> Self {
        Self {
            location,
            busy_timeout,
            conn: OnceCell::new(),
        }
    }

    /// Creates an uninitialized provider for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(DatabaseLocation::Memory, Duration::from_secs(5))
    }

    /// Wraps an already opened connection. The provider reports ready at once.
    ///
    /// The caller is responsible for the schema of `conn`.
    pub fn from_connection(conn: Connection) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Mutex::new(conn));
        Self {
            location: DatabaseLocation::Memory,
            busy_timeout: Duration::from_secs(5),
            conn: cell,
        }
    }
}

impl ConnectionProvider for SqliteConnectionProvider {
    fn is_ready(&self) -> bool {
        self.conn.get().is_some()
    }

    fn initialize(&self) -> DbResult<()> {
        if self.is_ready() {
            debug!("event=provider_init module=db status=skip reason=already_ready");
            return Ok(());
        }

        self.conn
            .get_or_try_init(|| open_location(&self.location, self.busy_timeout).map(Mutex::new))?;
        info!("event=provider_init module=db status=ok");
        Ok(())
    }

    fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        let cell = self.conn.get().ok_or(DbError::NotInitialized)?;
        let mut guard = cell.lock().map_err(|_| DbError::ConnectionPoisoned)?;
        f(&mut guard)
    }
}
