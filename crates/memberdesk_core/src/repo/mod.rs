//! Repository layer for member persistence.
//!
//! # Responsibility
//! - Isolate SQLite query details from callers.
//!
//! # Invariants
//! - Write paths validate input before any SQL mutation.
//! - Read paths reject malformed persisted rows instead of masking them.

pub mod member_store;
