//! Member store: persistence and query operations over `members`.
//!
//! # Responsibility
//! - Provide CRUD, filter, search and count APIs for membership records.
//! - Keep SQL text, bound parameters and row mapping inside this module.
//! - Surface every failure as a typed `StoreError` after logging it.
//!
//! # Invariants
//! - Insert never binds `id`; storage assigns it.
//! - Phone uniqueness: pre-checked before insert, enforced by a UNIQUE index.
//!   A UNIQUE violation from storage is reported as `DuplicatePhone`.
//! - Updates target rows by `id` and rewrite every other column.
//! - Listings are ordered by `id ASC`.
//! - Logs carry ids and counts only, never names or phone numbers.

use crate::db::{ConnectionProvider, DbError, SqliteConnectionProvider};
use crate::model::member::{
    Member, MemberId, MemberValidationError, NewMember, STATUS_ACTIVE, STATUS_EXPIRED,
};
use crate::report::render_member_table;
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

const TABLE_NAME: &str = "members";
const DATE_FORMAT: &str = "%Y-%m-%d";

const MEMBER_SELECT_SQL: &str = "SELECT
    id,
    name,
    phone,
    plan_type,
    start_date,
    end_date,
    status,
    membership_count
FROM members";

const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "name",
    "phone",
    "plan_type",
    "start_date",
    "end_date",
    "status",
    "membership_count",
];

/// Unicode lowercase for search; SQLite's `LOWER` folds ASCII only.
const FOLD_CASE_FN: &str = "memberdesk_fold_case";

const RESET_SEQUENCE_SQL: &str = "DELETE FROM sqlite_sequence WHERE name = ?1;";

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from member store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Write input failed field validation.
    Validation(MemberValidationError),
    /// Another member already uses this phone number.
    DuplicatePhone(String),
    /// No member row has this id.
    NotFound(MemberId),
    /// Backend unavailable or statement rejected.
    Db(DbError),
    /// Persisted row cannot be mapped to a `Member`.
    InvalidData(String),
    /// Connection schema lacks the members table.
    MissingRequiredTable(&'static str),
    /// Members table lacks an expected column.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl StoreError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DuplicatePhone(_) => "duplicate_phone",
            Self::NotFound(_) => "not_found",
            Self::Db(_) => "db_error",
            Self::InvalidData(_) => "invalid_data",
            Self::MissingRequiredTable(_) | Self::MissingRequiredColumn { .. } => "schema_missing",
        }
    }

    /// Returns whether the backend, rather than the caller's input, failed.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::Db(_)
                | Self::InvalidData(_)
                | Self::MissingRequiredTable(_)
                | Self::MissingRequiredColumn { .. }
        )
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicatePhone(_) => write!(f, "a member with this phone already exists"),
            Self::NotFound(id) => write!(f, "member not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted member data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "member store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "member store requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::DuplicatePhone(_) => None,
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<MemberValidationError> for StoreError {
    fn from(value: MemberValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Terminal outcome of [`MemberStore::clear_all`] when rows were removed.
///
/// Total failure (rows still present) is returned as `Err(StoreError::Db)`.
#[derive(Debug)]
pub enum ClearOutcome {
    /// Backend truncate emptied the table and reset the id sequence atomically.
    Truncated,
    /// Fallback path: rows deleted, then the id sequence reset.
    DeletedAndReset { rows_deleted: usize },
    /// Fallback path: rows deleted but the id sequence was left as is.
    SequenceNotReset { rows_deleted: usize, error: DbError },
}

impl ClearOutcome {
    /// Returns whether the next insert will receive the initial id again.
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::SequenceNotReset { .. })
    }
}

enum ClearPhase {
    Truncate,
    DeleteRows,
    ResetSequence { rows_deleted: usize },
    Done(ClearOutcome),
}

/// Aggregate member counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
}

/// Persistence and query component for membership records.
pub struct MemberStore<P: ConnectionProvider = SqliteConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> MemberStore<P> {
    /// Constructs a store, initializing the backend first when needed.
    ///
    /// # Errors
    /// - `Db` when the backend cannot be opened or migrated.
    /// - `MissingRequiredTable`/`MissingRequiredColumn` when the schema does
    ///   not match the member row shape.
    pub fn try_new(provider: P) -> StoreResult<Self> {
        if !provider.is_ready() {
            info!("event=store_init module=store status=start action=initialize_backend");
            provider
                .initialize()
                .map_err(|err| log_failure("store_init", err.into()))?;
        }

        provider
            .with_connection(|conn| -> StoreResult<()> {
                ensure_members_table(conn)?;
                register_fold_case(conn)
            })
            .map_err(|err| log_failure("store_init", err))?;

        Ok(Self { provider })
    }

    /// Returns the injected backend provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Lists every member ordered by id.
    pub fn list_all(&self) -> StoreResult<Vec<Member>> {
        let sql = format!("{MEMBER_SELECT_SQL} ORDER BY id ASC;");
        let members = self
            .query_members(&sql, Vec::new())
            .map_err(|err| log_failure("member_list", err))?;
        debug!(
            "event=member_list module=store status=ok count={}",
            members.len()
        );
        Ok(members)
    }

    /// Gets one member by id. `Ok(None)` means no row matched.
    pub fn get_by_id(&self, id: MemberId) -> StoreResult<Option<Member>> {
        let sql = format!("{MEMBER_SELECT_SQL} WHERE id = ?1;");
        let member = self
            .provider
            .with_connection(|conn| -> StoreResult<Option<Member>> {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query([id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(parse_member_row(row)?)),
                    None => Ok(None),
                }
            })
            .map_err(|err| log_failure("member_get", err))?;
        Ok(member)
    }

    /// Lists members on the given plan, ordered by id.
    pub fn list_by_plan(&self, plan_type: &str) -> StoreResult<Vec<Member>> {
        let sql = format!("{MEMBER_SELECT_SQL} WHERE plan_type = ?1 ORDER BY id ASC;");
        self.query_members(&sql, vec![Value::Text(plan_type.to_string())])
            .map_err(|err| log_failure("member_list_by_plan", err))
    }

    /// Lists members with the given status label, ordered by id.
    pub fn list_by_status(&self, status: &str) -> StoreResult<Vec<Member>> {
        let sql = format!("{MEMBER_SELECT_SQL} WHERE status = ?1 ORDER BY id ASC;");
        self.query_members(&sql, vec![Value::Text(status.to_string())])
            .map_err(|err| log_failure("member_list_by_status", err))
    }

    /// Searches members by name or phone.
    ///
    /// A blank keyword returns the same rows as [`Self::list_all`]. Otherwise
    /// the trimmed keyword matches `name` case-insensitively or `phone`
    /// case-sensitively, both as substrings.
    pub fn search(&self, keyword: &str) -> StoreResult<Vec<Member>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return self.list_all();
        }

        let sql = format!(
            "{MEMBER_SELECT_SQL}
             WHERE instr({FOLD_CASE_FN}(name), ?1) > 0
                OR instr(phone, ?2) > 0
             ORDER BY id ASC;"
        );
        let members = self
            .query_members(
                &sql,
                vec![
                    Value::Text(keyword.to_lowercase()),
                    Value::Text(keyword.to_string()),
                ],
            )
            .map_err(|err| log_failure("member_search", err))?;
        debug!(
            "event=member_search module=store status=ok keyword_len={} count={}",
            keyword.chars().count(),
            members.len()
        );
        Ok(members)
    }

    /// Returns whether any member has exactly this phone value.
    pub fn exists_by_phone(&self, phone: &str) -> StoreResult<bool> {
        self.provider
            .with_connection(|conn| -> StoreResult<bool> {
                let exists: i64 = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM members WHERE phone = ?1);",
                    [phone],
                    |row| row.get(0),
                )?;
                Ok(exists == 1)
            })
            .map_err(|err| log_failure("member_exists", err))
    }

    /// Counts members, optionally restricted to one status label.
    pub fn count_members(&self, status: Option<&str>) -> StoreResult<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM members");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(status) = status {
            sql.push_str(" WHERE status = ?1");
            bind_values.push(Value::Text(status.to_string()));
        }

        self.provider
            .with_connection(|conn| -> StoreResult<u64> {
                let count: i64 =
                    conn.query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
                u64::try_from(count)
                    .map_err(|_| StoreError::InvalidData(format!("negative row count {count}")))
            })
            .map_err(|err| log_failure("member_count", err))
    }

    pub fn total_members(&self) -> StoreResult<u64> {
        self.count_members(None)
    }

    pub fn active_members(&self) -> StoreResult<u64> {
        self.count_members(Some(STATUS_ACTIVE))
    }

    pub fn expired_members(&self) -> StoreResult<u64> {
        self.count_members(Some(STATUS_EXPIRED))
    }

    /// Collects total, active and expired counts.
    pub fn summary(&self) -> StoreResult<MemberSummary> {
        Ok(MemberSummary {
            total: self.total_members()?,
            active: self.active_members()?,
            expired: self.expired_members()?,
        })
    }

    /// Inserts a member and returns it with its storage-assigned id.
    ///
    /// # Errors
    /// - `Validation` for blank name or phone.
    /// - `DuplicatePhone` when the phone is already registered, whether caught
    ///   by the pre-check or by the UNIQUE index.
    /// - `Db` for any other backend failure.
    pub fn add(&self, member: &NewMember) -> StoreResult<Member> {
        member
            .validate()
            .map_err(|err| log_failure("member_add", err.into()))?;

        if self.exists_by_phone(&member.phone)? {
            return Err(log_failure(
                "member_add",
                StoreError::DuplicatePhone(member.phone.clone()),
            ));
        }

        let id = self
            .provider
            .with_connection(|conn| -> StoreResult<MemberId> {
                conn.execute(
                    "INSERT INTO members (
                        name,
                        phone,
                        plan_type,
                        start_date,
                        end_date,
                        status,
                        membership_count
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                    params![
                        member.name.as_str(),
                        member.phone.as_str(),
                        member.plan_type.as_str(),
                        date_to_db(member.start_date),
                        date_to_db(member.end_date),
                        member.status.as_str(),
                        member.membership_count,
                    ],
                )
                .map_err(|err| map_write_error(err.into(), &member.phone))?;
                Ok(conn.last_insert_rowid())
            })
            .map_err(|err| log_failure("member_add", err))?;

        info!("event=member_add module=store status=ok member_id={id}");
        Ok(Member::from_new(id, member.clone()))
    }

    /// Overwrites every field of the member identified by `member.id`.
    ///
    /// # Errors
    /// - `NotFound` when no row has that id.
    /// - `DuplicatePhone` when the new phone belongs to another member.
    pub fn update(&self, member: &Member) -> StoreResult<()> {
        member
            .validate()
            .map_err(|err| log_failure("member_update", err.into()))?;

        let bind_values = vec![
            Value::Text(member.name.clone()),
            Value::Text(member.phone.clone()),
            Value::Text(member.plan_type.clone()),
            Value::Text(date_to_db(member.start_date)),
            Value::Text(date_to_db(member.end_date)),
            Value::Text(member.status.clone()),
            Value::Integer(member.membership_count),
            Value::Integer(member.id),
        ];
        let changed = self
            .provider
            .execute_update(
                "UPDATE members
                 SET
                    name = ?1,
                    phone = ?2,
                    plan_type = ?3,
                    start_date = ?4,
                    end_date = ?5,
                    status = ?6,
                    membership_count = ?7
                 WHERE id = ?8;",
                &bind_values,
            )
            .map_err(|err| log_failure("member_update", map_write_error(err, &member.phone)))?;

        if changed == 0 {
            return Err(log_failure("member_update", StoreError::NotFound(member.id)));
        }

        info!(
            "event=member_update module=store status=ok member_id={}",
            member.id
        );
        Ok(())
    }

    /// Removes the member with this id.
    pub fn delete(&self, id: MemberId) -> StoreResult<()> {
        let changed = self
            .provider
            .execute_update("DELETE FROM members WHERE id = ?1;", &[Value::Integer(id)])
            .map_err(|err| log_failure("member_delete", err.into()))?;

        if changed == 0 {
            return Err(log_failure("member_delete", StoreError::NotFound(id)));
        }

        info!("event=member_delete module=store status=ok member_id={id}");
        Ok(())
    }

    /// Removes every member and resets the id sequence.
    ///
    /// Tries the backend's atomic truncate first. When that is rejected, falls
    /// back to deleting all rows and then resetting the sequence separately.
    /// A failed reset after a successful delete is reported as
    /// `ClearOutcome::SequenceNotReset`, not as an error.
    pub fn clear_all(&self) -> StoreResult<ClearOutcome> {
        let mut phase = ClearPhase::Truncate;
        loop {
            phase = match phase {
                ClearPhase::Truncate => match self.provider.truncate_table(TABLE_NAME) {
                    Ok(()) => ClearPhase::Done(ClearOutcome::Truncated),
                    Err(err) => {
                        warn!(
                            "event=member_clear module=store status=fallback phase=truncate error={}",
                            err
                        );
                        ClearPhase::DeleteRows
                    }
                },
                ClearPhase::DeleteRows => {
                    match self
                        .provider
                        .execute_update(&format!("DELETE FROM {TABLE_NAME};"), &[])
                    {
                        Ok(rows_deleted) => ClearPhase::ResetSequence { rows_deleted },
                        Err(err) => return Err(log_failure("member_clear", err.into())),
                    }
                }
                ClearPhase::ResetSequence { rows_deleted } => {
                    match self.provider.execute_update(
                        RESET_SEQUENCE_SQL,
                        &[Value::Text(TABLE_NAME.to_string())],
                    ) {
                        Ok(_) => ClearPhase::Done(ClearOutcome::DeletedAndReset { rows_deleted }),
                        Err(error) => {
                            error!(
                                "event=member_clear module=store status=partial phase=reset_sequence rows_deleted={} error={}",
                                rows_deleted, error
                            );
                            ClearPhase::Done(ClearOutcome::SequenceNotReset {
                                rows_deleted,
                                error,
                            })
                        }
                    }
                }
                ClearPhase::Done(outcome) => {
                    if outcome.is_complete() {
                        info!("event=member_clear module=store status=ok outcome={outcome:?}");
                    }
                    return Ok(outcome);
                }
            };
        }
    }

    /// Writes the member table and status summary to stdout.
    pub fn print_all_members(&self) -> StoreResult<()> {
        let members = self.list_all()?;
        let summary = self.summary()?;
        println!("{}", render_member_table(&members, &summary));
        Ok(())
    }

    fn query_members(&self, sql: &str, bind_values: Vec<Value>) -> StoreResult<Vec<Member>> {
        self.provider
            .with_connection(|conn| -> StoreResult<Vec<Member>> {
                let mut stmt = conn.prepare(sql)?;
                let mut rows = stmt.query(params_from_iter(bind_values))?;
                let mut members = Vec::new();

                while let Some(row) = rows.next()? {
                    members.push(parse_member_row(row)?);
                }

                Ok(members)
            })
    }
}

fn ensure_members_table(conn: &mut Connection) -> StoreResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [TABLE_NAME],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(StoreError::MissingRequiredTable(TABLE_NAME));
    }

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
    let columns = stmt
        .query_map([TABLE_NAME], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    for column in REQUIRED_COLUMNS {
        if !columns.iter().any(|name| name == column) {
            return Err(StoreError::MissingRequiredColumn {
                table: TABLE_NAME,
                column,
            });
        }
    }

    Ok(())
}

fn parse_member_row(row: &Row<'_>) -> StoreResult<Member> {
    let start_text: String = row.get("start_date")?;
    let end_text: String = row.get("end_date")?;

    Ok(Member {
        id: row.get("id")?,
        name: row.get("name")?,
        phone: row.get("phone")?,
        plan_type: row.get("plan_type")?,
        start_date: parse_date(&start_text, "members.start_date")?,
        end_date: parse_date(&end_text, "members.end_date")?,
        status: row.get("status")?,
        membership_count: row.get("membership_count")?,
    })
}

fn parse_date(value: &str, column: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|err| StoreError::InvalidData(format!("invalid date `{value}` in {column}: {err}")))
}

fn date_to_db(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn map_write_error(err: DbError, phone: &str) -> StoreError {
    if err.is_unique_violation() {
        return StoreError::DuplicatePhone(phone.to_string());
    }
    StoreError::Db(err)
}

fn register_fold_case(conn: &mut Connection) -> StoreResult<()> {
    conn.create_scalar_function(
        FOLD_CASE_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|text| text.to_lowercase()))
        },
    )?;
    Ok(())
}

fn log_failure(event: &str, err: StoreError) -> StoreError {
    if err.is_backend_failure() {
        error!(
            "event={} module=store status=error error_code={} error={}",
            event,
            err.code(),
            err
        );
    } else {
        warn!(
            "event={} module=store status=rejected error_code={} error={}",
            event,
            err.code(),
            err
        );
    }
    err
}

#[cfg(test)]
mod tests {
    use super::{map_write_error, parse_date, register_fold_case, StoreError, FOLD_CASE_FN};
    use crate::db::DbError;
    use chrono::NaiveDate;

    #[test]
    fn fold_case_lowercases_non_ascii_letters() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        register_fold_case(&mut conn).unwrap();

        let folded: String = conn
            .query_row(&format!("SELECT {FOLD_CASE_FN}(?1);"), ["ÉMILE Çelik"], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(folded, "émile çelik");

        let null: Option<String> = conn
            .query_row(&format!("SELECT {FOLD_CASE_FN}(NULL);"), [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }

    #[test]
    fn parse_date_accepts_iso_calendar_dates() {
        let date = parse_date("2024-01-15", "members.start_date").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn parse_date_rejects_malformed_text() {
        let err = parse_date("15/01/2024", "members.end_date").unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(message) if message.contains("members.end_date")));
    }

    #[test]
    fn non_unique_write_errors_stay_backend_errors() {
        let err = map_write_error(DbError::NotInitialized, "555-0100");
        assert!(matches!(err, StoreError::Db(DbError::NotInitialized)));
        assert!(err.is_backend_failure());
    }

    #[test]
    fn duplicate_phone_display_does_not_leak_the_number() {
        let err = StoreError::DuplicatePhone("555-0100".to_string());
        assert!(!err.to_string().contains("555-0100"));
        assert_eq!(err.code(), "duplicate_phone");
    }
}
