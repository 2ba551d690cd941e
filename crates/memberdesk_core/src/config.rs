//! Store configuration.
//!
//! # Responsibility
//! - Describe where the member database lives and how connections behave.
//! - Build the SQLite provider injected into `MemberStore`.
//!
//! # Invariants
//! - Missing fields fall back to `StoreConfig::default()` values.

use crate::db::{DatabaseLocation, SqliteConnectionProvider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Connection settings for the member store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: DatabaseLocation,
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::Memory,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Config for a database file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseLocation::File(path.into()),
            ..Self::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Builds an uninitialized provider; `MemberStore::try_new` opens it.
    pub fn into_provider(self) -> SqliteConnectionProvider {
        let busy_timeout = self.busy_timeout();
        SqliteConnectionProvider::new(self.database, busy_timeout)
    }
}
