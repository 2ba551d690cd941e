use chrono::NaiveDate;
use memberdesk_core::db::migrations::latest_version;
use memberdesk_core::{
    ConnectionProvider, Member, MemberStore, MemberValidationError, NewMember,
    SqliteConnectionProvider, StoreConfig, StoreError,
};
use memberdesk_core::DbError;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::cell::Cell;
use std::sync::Barrier;

#[test]
fn add_and_get_roundtrip() {
    let store = new_store();

    let input = alice();
    let created = store.add(&input).unwrap();
    assert_eq!(created.id, 1);

    let loaded = store.get_by_id(created.id).unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.to_new_member(), input);
}

#[test]
fn add_assigns_increasing_ids() {
    let store = new_store();

    let first = store.add(&member("Alice", "555-0100", "Active")).unwrap();
    let second = store.add(&member("Bob", "555-0101", "Active")).unwrap();

    assert!(second.id > first.id);
}

#[test]
fn duplicate_phone_is_rejected_without_writing() {
    let store = new_store();

    store.add(&alice()).unwrap();
    assert_eq!(store.total_members().unwrap(), 1);
    assert_eq!(store.active_members().unwrap(), 1);

    let twin = member("Alicia", "555-0100", "Expired");
    let err = store.add(&twin).unwrap_err();

    assert!(matches!(err, StoreError::DuplicatePhone(ref phone) if phone == "555-0100"));
    assert_eq!(store.total_members().unwrap(), 1);
    assert_eq!(store.expired_members().unwrap(), 0);
}

/// Lands a rival insert for the same phone between the store's pre-check and
/// its own insert, the way a concurrent writer would.
struct RivalWriterProvider {
    inner: SqliteConnectionProvider,
    calls_before_rival: Cell<Option<usize>>,
}

impl ConnectionProvider for RivalWriterProvider {
    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn initialize(&self) -> Result<(), DbError> {
        self.inner.initialize()
    }

    fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        match self.calls_before_rival.get() {
            Some(0) => {
                self.calls_before_rival.set(None);
                self.inner.execute_update(
                    "INSERT INTO members (name, phone, plan_type, start_date, end_date, status, membership_count)
                     VALUES ('Rival', ?1, 'Gold', '2024-01-01', '2025-01-01', 'Active', 1);",
                    &[Value::Text("555-0100".to_string())],
                )?;
            }
            Some(remaining) => self.calls_before_rival.set(Some(remaining - 1)),
            None => {}
        }
        self.inner.with_connection(f)
    }
}

#[test]
fn unique_index_reports_duplicate_when_precheck_is_outrun() {
    let store = MemberStore::try_new(RivalWriterProvider {
        inner: SqliteConnectionProvider::in_memory(),
        calls_before_rival: Cell::new(None),
    })
    .unwrap();

    // First call is the phone pre-check, the rival lands before the insert.
    store.provider().calls_before_rival.set(Some(1));
    let err = store.add(&alice()).unwrap_err();

    assert!(matches!(err, StoreError::DuplicatePhone(ref phone) if phone == "555-0100"));
    assert_eq!(store.total_members().unwrap(), 1);
    assert_eq!(store.list_all().unwrap()[0].name, "Rival");
}

#[test]
fn concurrent_adds_with_same_phone_keep_one_row() {
    let store = new_store();
    let barrier = Barrier::new(2);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["Alice", "Alicia"]
            .into_iter()
            .map(|name| {
                let store = &store;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    store.add(&member(name, "555-0100", "Active"))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|result| matches!(result, Err(StoreError::DuplicatePhone(_)))));
    assert_eq!(store.total_members().unwrap(), 1);
}

#[test]
fn exists_by_phone_requires_exact_match() {
    let store = new_store();
    store.add(&alice()).unwrap();

    assert!(store.exists_by_phone("555-0100").unwrap());
    assert!(!store.exists_by_phone("555-010").unwrap());
    assert!(!store.exists_by_phone("555-0199").unwrap());
}

#[test]
fn add_rejects_blank_name_and_phone() {
    let store = new_store();

    let err = store.add(&member("   ", "555-0100", "Active")).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(MemberValidationError::EmptyName)
    ));

    let err = store.add(&member("Alice", "", "Active")).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(MemberValidationError::EmptyPhone)
    ));

    assert_eq!(store.total_members().unwrap(), 0);
}

#[test]
fn update_overwrites_every_field() {
    let store = new_store();
    let mut stored = store.add(&alice()).unwrap();

    stored.name = "Alice Smith".to_string();
    stored.phone = "555-0199".to_string();
    stored.plan_type = "Platinum".to_string();
    stored.start_date = date(2025, 1, 1);
    stored.end_date = date(2026, 1, 1);
    stored.status = "Expired".to_string();
    stored.membership_count = 2;
    store.update(&stored).unwrap();

    let loaded = store.get_by_id(stored.id).unwrap().unwrap();
    assert_eq!(loaded, stored);
    assert!(!store.exists_by_phone("555-0100").unwrap());
}

#[test]
fn update_twice_with_same_values_is_idempotent() {
    let store = new_store();
    let mut stored = store.add(&alice()).unwrap();
    stored.membership_count = 5;

    store.update(&stored).unwrap();
    let after_first = store.list_all().unwrap();
    store.update(&stored).unwrap();
    let after_second = store.list_all().unwrap();

    assert_eq!(after_first, after_second);
}

#[test]
fn update_missing_id_returns_not_found() {
    let store = new_store();
    let ghost = Member::from_new(42, alice());

    let err = store.update(&ghost).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(42)));
    assert!(store.list_all().unwrap().is_empty());
}

#[test]
fn update_to_taken_phone_returns_duplicate() {
    let store = new_store();
    store.add(&alice()).unwrap();
    let mut bob = store.add(&member("Bob", "555-0101", "Active")).unwrap();

    bob.phone = "555-0100".to_string();
    let err = store.update(&bob).unwrap_err();

    assert!(matches!(err, StoreError::DuplicatePhone(_)));
    let reloaded = store.get_by_id(bob.id).unwrap().unwrap();
    assert_eq!(reloaded.phone, "555-0101");
}

#[test]
fn delete_removes_row() {
    let store = new_store();
    let stored = store.add(&alice()).unwrap();

    store.delete(stored.id).unwrap();

    assert!(store.get_by_id(stored.id).unwrap().is_none());
    assert_eq!(store.total_members().unwrap(), 0);
}

#[test]
fn delete_missing_id_returns_not_found_and_keeps_rows() {
    let store = new_store();
    store.add(&alice()).unwrap();
    let before = store.list_all().unwrap();

    let err = store.delete(999).unwrap_err();

    assert!(matches!(err, StoreError::NotFound(999)));
    assert_eq!(store.list_all().unwrap(), before);
}

#[test]
fn get_by_id_returns_none_for_unknown_id() {
    let store = new_store();
    assert!(store.get_by_id(7).unwrap().is_none());
}

#[test]
fn malformed_stored_date_fails_the_read() {
    let store = new_store();
    let stored = store.add(&alice()).unwrap();

    store
        .provider()
        .with_connection(|conn| -> Result<usize, DbError> {
            Ok(conn.execute(
                "UPDATE members SET end_date = 'next year' WHERE id = ?1;",
                [stored.id],
            )?)
        })
        .unwrap();

    let err = store.get_by_id(stored.id).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(ref message) if message.contains("end_date")));
    assert!(err.is_backend_failure());

    // Counting does not map rows, so it still works.
    assert_eq!(store.total_members().unwrap(), 1);
}

#[test]
fn try_new_initializes_lazy_provider() {
    let provider = SqliteConnectionProvider::in_memory();
    assert!(!provider.is_ready());

    let store = MemberStore::try_new(provider).unwrap();

    assert!(store.provider().is_ready());
    store.provider().initialize().unwrap();
    assert_eq!(store.total_members().unwrap(), 0);
}

#[test]
fn file_backed_store_persists_across_providers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("members.sqlite3");

    {
        let store = MemberStore::try_new(StoreConfig::file(&path).into_provider()).unwrap();
        store.add(&alice()).unwrap();
    }

    let store = MemberStore::try_new(StoreConfig::file(&path).into_provider()).unwrap();
    let members = store.list_all().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].name, "Alice");
}

#[test]
fn uninitialized_provider_reports_not_initialized() {
    let provider = SqliteConnectionProvider::in_memory();

    let err = provider
        .execute_update("DELETE FROM members;", &[])
        .unwrap_err();

    assert!(matches!(err, DbError::NotInitialized));
}

#[test]
fn store_rejects_connection_without_members_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = MemberStore::try_new(SqliteConnectionProvider::from_connection(conn));
    assert!(matches!(
        result,
        Err(StoreError::MissingRequiredTable("members"))
    ));
}

#[test]
fn store_rejects_members_table_missing_a_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            phone TEXT NOT NULL,
            plan_type TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            status TEXT NOT NULL
        );",
    )
    .unwrap();

    let result = MemberStore::try_new(SqliteConnectionProvider::from_connection(conn));
    assert!(matches!(
        result,
        Err(StoreError::MissingRequiredColumn {
            table: "members",
            column: "membership_count"
        })
    ));
}

fn new_store() -> MemberStore {
    MemberStore::try_new(SqliteConnectionProvider::in_memory()).unwrap()
}

fn alice() -> NewMember {
    NewMember::new(
        "Alice",
        "555-0100",
        "Gold",
        date(2024, 1, 1),
        date(2025, 1, 1),
        "Active",
        1,
    )
}

fn member(name: &str, phone: &str, status: &str) -> NewMember {
    NewMember::new(
        name,
        phone,
        "Gold",
        date(2024, 1, 1),
        date(2025, 1, 1),
        status,
        1,
    )
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
