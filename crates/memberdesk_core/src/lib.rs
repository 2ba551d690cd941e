//! Core persistence for the club membership desk.
//! This crate owns member storage, uniqueness and query contracts.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod report;

pub use config::StoreConfig;
pub use db::{ConnectionProvider, DatabaseLocation, DbError, SqliteConnectionProvider};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::member::{
    Member, MemberId, MemberValidationError, NewMember, STATUS_ACTIVE, STATUS_EXPIRED,
};
pub use repo::member_store::{
    ClearOutcome, MemberStore, MemberSummary, StoreError, StoreResult,
};
pub use report::render_member_table;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
