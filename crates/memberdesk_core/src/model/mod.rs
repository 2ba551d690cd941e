//! Domain model for club membership records.
//!
//! # Responsibility
//! - Define the data structures exchanged with the member store.
//!
//! # Invariants
//! - Every stored member is identified by a storage-assigned `MemberId`.
//! - Removal is a hard delete; there are no tombstones.

pub mod member;
