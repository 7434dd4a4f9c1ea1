//! Spreadsheet import pipeline.
//!
//! decode (CSV / XLSX / XLS) -> normalize per schema -> reconcile by natural
//! key against a [`RecordStore`]. Both record types (agents, call statistics)
//! go through the same code path, they only differ in their [`Schema`] and
//! record constructor.

pub mod agents;
pub mod call_statistics;
pub mod decode;
pub mod memory;
pub mod normalize;
pub mod reconcile;
pub mod store;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{ImportIssue, ImportOutcome, ImportRow, RecordError};

pub use memory::MemoryStore;
pub use normalize::{normalize_row, FieldMap, Schema};
pub use reconcile::{reconcile, PendingRecord};
pub use store::{ImportRecord, KeyLookup, RecordStore, StoreError, Stored};

/// Whole-file failures. Nothing is written when one of these is returned.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Nicht unterstütztes Dateiformat: {0}. Erlaubt sind .csv, .xlsx und .xls")]
    UnsupportedFormat(String),
    #[error("Die Datei enthält keine Datenzeilen")]
    EmptyFile,
    #[error("Datei konnte nicht gelesen werden: {0}")]
    Parse(String),
}

impl ImportError {
    /// Error code used in NATS error responses
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ImportError::EmptyFile => "EMPTY_FILE",
            ImportError::Parse(_) => "INVALID_REQUEST",
        }
    }
}

/// A record type with an import schema
pub trait Importable: ImportRecord {
    const SCHEMA: &'static Schema;

    fn from_fields(fields: &FieldMap) -> Result<Self, RecordError>;
}

/// Normalize rows and build typed records.
///
/// Rows missing a natural-key field are counted as skipped and never reach
/// the store.
pub fn prepare<R: Importable>(
    rows: &[ImportRow],
    today: NaiveDate,
    outcome: &mut ImportOutcome,
) -> Vec<PendingRecord<R>> {
    let mut pending = Vec::with_capacity(rows.len());

    for row in rows {
        let normalized = normalize_row(row, R::SCHEMA, today);
        outcome.issues.extend(normalized.issues.iter().cloned());

        if !normalized.is_valid() {
            outcome.skipped += 1;
            outcome.issues.push(ImportIssue::warning(
                row.line,
                normalized.missing[0],
                format!("Pflichtfeld fehlt: {}", normalized.missing.join(", ")),
                None,
            ));
            continue;
        }

        match R::from_fields(&normalized.fields) {
            Ok(record) => pending.push(PendingRecord {
                line: row.line,
                record,
            }),
            Err(e) => {
                outcome.skipped += 1;
                outcome.issues.push(ImportIssue::warning(row.line, "", e.to_string(), None));
            }
        }
    }

    pending
}

/// Reconcile already decoded rows against `store`
pub async fn import_rows<R, S>(store: &S, rows: &[ImportRow], today: NaiveDate) -> ImportOutcome
where
    R: Importable,
    S: RecordStore<R> + ?Sized,
{
    let mut outcome = ImportOutcome::default();
    let pending = prepare::<R>(rows, today, &mut outcome);

    if outcome.skipped > 0 {
        warn!("{} import: {} rows skipped before reconciliation", R::SCHEMA.kind, outcome.skipped);
    }

    reconcile(store, pending, &mut outcome).await;
    outcome
}

/// Decode `content` according to `filename` and reconcile it against `store`
pub async fn run_import<R, S>(
    store: &S,
    filename: &str,
    content: &[u8],
    today: NaiveDate,
) -> Result<ImportOutcome, ImportError>
where
    R: Importable,
    S: RecordStore<R> + ?Sized,
{
    let rows = decode::decode_file(filename, content)?;
    info!("{} import from {}: {} rows", R::SCHEMA.kind, filename, rows.len());

    let outcome = import_rows::<R, S>(store, &rows, today).await;
    info!("{} import from {}: {}", R::SCHEMA.kind, filename, outcome.summary());

    Ok(outcome)
}

/// Remove every record of one kind
pub async fn delete_all<R, S>(store: &S) -> Result<u64, StoreError>
where
    R: Importable,
    S: RecordStore<R> + ?Sized,
{
    let deleted = store.delete_all().await?;
    info!("{}: deleted all {} rows", R::SCHEMA.kind, deleted);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentRecord, AgentStatus, CallStatisticKey, CallStatisticRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn agent_row(line: usize, name: &str, gruppe: &str, status: &str) -> ImportRow {
        ImportRow::new(line)
            .with("Agent Name", name)
            .with("Gruppe", gruppe)
            .with("Status", status)
    }

    /// Wraps a memory store and fails lookups or writes for one key
    struct FlakyStore {
        inner: MemoryStore<AgentRecord>,
        fail_lookup_for: Option<&'static str>,
        fail_write_for: Option<&'static str>,
        writes: AtomicUsize,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_lookup_for: None,
                fail_write_for: None,
                writes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordStore<AgentRecord> for FlakyStore {
        async fn find_by_key(&self, key: &String) -> KeyLookup<AgentRecord> {
            if self.fail_lookup_for == Some(key.as_str()) {
                return KeyLookup::Failed(StoreError::Rejected("connection reset".into()));
            }
            self.inner.find_by_key(key).await
        }

        async fn insert(&self, record: &AgentRecord) -> Result<Uuid, StoreError> {
            if self.fail_write_for == Some(record.name()) {
                return Err(StoreError::Rejected("constraint violated".into()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.insert(record).await
        }

        async fn update(&self, id: Uuid, record: &AgentRecord) -> Result<(), StoreError> {
            if self.fail_write_for == Some(record.name()) {
                return Err(StoreError::Rejected("constraint violated".into()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.update(id, record).await
        }

        async fn delete_all(&self) -> Result<u64, StoreError> {
            self.inner.delete_all().await
        }
    }

    #[tokio::test]
    async fn test_same_key_twice_in_one_file_inserts_then_updates() {
        let store = MemoryStore::<AgentRecord>::new();
        let rows = vec![agent_row(2, "Alice", "DE", "aktiv"), agent_row(3, "Alice", "EN", "aktiv")];

        let outcome = import_rows::<AgentRecord, _>(&store, &rows, today()).await;

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.updated, 1);
        assert_eq!(store.len(), 1);
        let stored = store.get(&"Alice".to_string()).unwrap();
        assert_eq!(stored.record.gruppe(), "EN");
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let store = MemoryStore::<AgentRecord>::new();
        let rows = vec![agent_row(2, "Alice", "DE", "aktiv"), agent_row(3, "Bob", "EN", "off")];

        let first = import_rows::<AgentRecord, _>(&store, &rows, today()).await;
        let before = store.get(&"Bob".to_string()).unwrap();
        let second = import_rows::<AgentRecord, _>(&store, &rows, today()).await;
        let after = store.get(&"Bob".to_string()).unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(before.updated_at, after.updated_at);
        assert_eq!(after.record.status(), AgentStatus::Inactive);
    }

    #[tokio::test]
    async fn test_missing_key_rows_skipped_without_writes() {
        let store = FlakyStore::new();
        let rows = vec![
            ImportRow::new(2).with("Gruppe", "DE"),
            agent_row(3, "  ", "EN", "aktiv"),
        ];

        let outcome = import_rows::<AgentRecord, _>(&store, &rows, today()).await;

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.processed(), 2);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.issues.len(), 2);
        assert_eq!(outcome.issues[0].row_number, 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_only_affects_its_row() {
        let store = FlakyStore {
            fail_lookup_for: Some("Bob"),
            ..FlakyStore::new()
        };
        let rows = vec![
            agent_row(2, "Alice", "DE", "aktiv"),
            agent_row(3, "Bob", "DE", "aktiv"),
            agent_row(4, "Carol", "EN", "aktiv"),
        ];

        let outcome = import_rows::<AgentRecord, _>(&store, &rows, today()).await;

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.errored, 1);
        assert!(store.inner.get(&"Bob".to_string()).is_none());
        assert!(store.inner.get(&"Carol".to_string()).is_some());
        assert_eq!(outcome.issues[0].row_number, 3);
    }

    #[tokio::test]
    async fn test_write_failure_counts_as_errored() {
        let store = FlakyStore {
            fail_write_for: Some("Alice"),
            ..FlakyStore::new()
        };
        let rows = vec![agent_row(2, "Alice", "DE", "aktiv"), agent_row(3, "Bob", "DE", "aktiv")];

        let outcome = import_rows::<AgentRecord, _>(&store, &rows, today()).await;

        assert_eq!(outcome.errored, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.processed(), 2);
    }

    #[tokio::test]
    async fn test_run_import_rejects_unsupported_format_without_writes() {
        let store = MemoryStore::<AgentRecord>::new();

        let result = run_import::<AgentRecord, _>(&store, "agents.txt", b"Name\nAlice\n", today()).await;

        let err = assert_err!(result);
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_run_import_rejects_empty_file() {
        let store = MemoryStore::<AgentRecord>::new();

        let result = run_import::<AgentRecord, _>(&store, "agents.csv", b"Name,Gruppe\n", today()).await;

        assert!(matches!(result, Err(ImportError::EmptyFile)));
    }

    #[tokio::test]
    async fn test_run_import_csv_end_to_end() {
        let store = MemoryStore::<AgentRecord>::new();
        let csv = "Agent Name;Gruppe;Status\nAlice;DE;aktiv\nBob;;off\n;EN;aktiv\n";

        let outcome = assert_ok!(run_import::<AgentRecord, _>(&store, "Agents.CSV", csv.as_bytes(), today()).await);

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.skipped, 1);
        let bob = store.get(&"Bob".to_string()).unwrap();
        assert_eq!(bob.record.gruppe(), "DE");
        assert_eq!(bob.record.status(), AgentStatus::Inactive);
    }

    #[tokio::test]
    async fn test_windows_1252_byte_does_not_drop_other_rows() {
        let store = MemoryStore::<AgentRecord>::new();
        let csv = b"Agent Name;Gruppe;Status\nAlice;DE;aktiv\nM\xFCller;DE;aktiv\nBob;EN;off\n";

        let outcome = assert_ok!(run_import::<AgentRecord, _>(&store, "agents.csv", csv, today()).await);

        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.errored, 0);
        assert!(store.get(&"Alice".to_string()).is_some());
        assert!(store.get(&"Bob".to_string()).is_some());
    }

    #[tokio::test]
    async fn test_call_statistics_reconcile_on_full_key() {
        let store = MemoryStore::<CallStatisticRecord>::new();
        let csv = "team_name,last_name,first_name,DateColumn,num_calls_answered\n\
                   Hotline,Meier,Anna,2024-05-02,10\n\
                   Hotline,Meier,Anna,2024-05-03,4\n\
                   Hotline,Meier,Anna,2024-05-02,12\n";

        let outcome = assert_ok!(
            run_import::<CallStatisticRecord, _>(&store, "stats.csv", csv.as_bytes(), today()).await
        );

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.updated, 1);
        let key = CallStatisticKey {
            team_name: "Hotline".into(),
            last_name: "Meier".into(),
            first_name: "Anna".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        };
        assert_eq!(store.get(&key).unwrap().record.metrics().num_calls_answered, 12);
    }

    #[tokio::test]
    async fn test_delete_all_then_import_starts_fresh() {
        let store = MemoryStore::<AgentRecord>::new();
        let rows = vec![agent_row(2, "Alice", "DE", "aktiv")];
        import_rows::<AgentRecord, _>(&store, &rows, today()).await;

        let deleted = assert_ok!(delete_all::<AgentRecord, _>(&store).await);
        let outcome = import_rows::<AgentRecord, _>(&store, &rows, today()).await;

        assert_eq!(deleted, 1);
        assert_eq!(outcome.inserted, 1);
    }

    #[test]
    fn test_prepare_collects_normalizer_warnings() {
        let rows = vec![ImportRow::new(2)
            .with("team_name", "T")
            .with("last_name", "L")
            .with("first_name", "F")
            .with("DateColumn", "kein Datum")];
        let mut outcome = ImportOutcome::default();

        let pending = prepare::<CallStatisticRecord>(&rows, today(), &mut outcome);

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record.key().date, today());
        assert!(outcome.issues.iter().any(|i| i.field == "date"));
    }

    #[test]
    fn test_new_agent_record_from_row_helper() {
        let rows = vec![agent_row(7, "Alice", "EN", "off")];
        let mut outcome = ImportOutcome::default();

        let pending = prepare::<AgentRecord>(&rows, today(), &mut outcome);

        assert_eq!(pending[0].line, 7);
        assert_eq!(pending[0].record, AgentRecord::new("Alice", "EN", AgentStatus::Inactive).unwrap());
    }
}
