//! Member domain model.
//!
//! # Responsibility
//! - Define the canonical membership record persisted by the store.
//! - Separate insert input (`NewMember`) from stored records (`Member`).
//!
//! # Invariants
//! - `id` is assigned by storage and never supplied on insert.
//! - `phone` is the natural key; uniqueness is enforced by the store.
//! - `status` is opaque data and is never derived from dates here.
//! - `end_date >= start_date` is the caller's responsibility.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-assigned surrogate key.
pub type MemberId = i64;

/// Status label counted by `MemberStore::active_members`.
pub const STATUS_ACTIVE: &str = "Active";
/// Status label counted by `MemberStore::expired_members`.
pub const STATUS_EXPIRED: &str = "Expired";

/// Validation failures for member write paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberValidationError {
    /// `name` is empty or whitespace only.
    EmptyName,
    /// `phone` is empty or whitespace only.
    EmptyPhone,
}

impl Display for MemberValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "member name must not be empty"),
            Self::EmptyPhone => write!(f, "member phone must not be empty"),
        }
    }
}

impl Error for MemberValidationError {}

/// Member fields accepted by insert, without the surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub phone: String,
    /// Membership tier label, free-form.
    pub plan_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Stored verbatim, e.g. `Active` or `Expired`.
    pub status: String,
    /// Renewal counter, managed by the caller.
    pub membership_count: i64,
}

impl NewMember {
    /// Creates an insert request.
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        plan_type: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        status: impl Into<String>,
        membership_count: i64,
    ) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            plan_type: plan_type.into(),
            start_date,
            end_date,
            status: status.into(),
            membership_count,
        }
    }

    /// Checks fields required before any write.
    pub fn validate(&self) -> Result<(), MemberValidationError> {
        validate_fields(&self.name, &self.phone)
    }
}

/// Persisted membership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub phone: String,
    pub plan_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub membership_count: i64,
}

impl Member {
    /// Attaches a storage-assigned id to insert input.
    pub fn from_new(id: MemberId, member: NewMember) -> Self {
        Self {
            id,
            name: member.name,
            phone: member.phone,
            plan_type: member.plan_type,
            start_date: member.start_date,
            end_date: member.end_date,
            status: member.status,
            membership_count: member.membership_count,
        }
    }

    /// Returns every field except `id`.
    pub fn to_new_member(&self) -> NewMember {
        NewMember {
            name: self.name.clone(),
            phone: self.phone.clone(),
            plan_type: self.plan_type.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status.clone(),
            membership_count: self.membership_count,
        }
    }

    /// Checks fields required before any write.
    pub fn validate(&self) -> Result<(), MemberValidationError> {
        validate_fields(&self.name, &self.phone)
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    pub fn is_expired(&self) -> bool {
        self.status == STATUS_EXPIRED
    }
}

fn validate_fields(name: &str, phone: &str) -> Result<(), MemberValidationError> {
    if name.trim().is_empty() {
        return Err(MemberValidationError::EmptyName);
    }
    if phone.trim().is_empty() {
        return Err(MemberValidationError::EmptyPhone);
    }
    Ok(())
}
