//! SQLite-backed `EntryStore` and `IssueIndex` with durable persistence.

use crate::{
    CommentRef, EntryFields, EntryStatus, EntryStore, IssueIndex, StoreError, StoreResult,
    ThreadIndexEntry, ThreadRef, TrackingRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENTRY_COLUMNS: &str = "id, command_name, thread_ref, status, args_json, fields_json, version, created_at, updated_at";

/// Persistent SQLite backend holding both tracking records and thread rows.
#[derive(Debug)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                command_name TEXT NOT NULL,
                thread_ref INTEGER NOT NULL,
                status TEXT NOT NULL,
                args_json TEXT NOT NULL,
                fields_json TEXT NOT NULL,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_thread ON entries (thread_ref);

            CREATE TABLE IF NOT EXISTS thread_index (
                thread_ref INTEGER PRIMARY KEY,
                namespace TEXT NULL,
                summary_comment_ref INTEGER NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn apply_update(
        &self,
        id: &str,
        expected_version: Option<u64>,
        partial: EntryFields,
        status: Option<EntryStatus>,
    ) -> StoreResult<TrackingRecord> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut record = select_entry(&transaction, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(expected) = expected_version {
            if record.version != expected {
                return Err(StoreError::VersionConflict {
                    id: id.to_string(),
                    expected,
                    actual: record.version,
                });
            }
        }

        record.apply_update(partial, status);
        transaction.execute(
            r#"
            UPDATE entries
            SET status = ?1, fields_json = ?2, version = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                record.status.as_str(),
                serde_json::to_string(&record.fields)?,
                u64_to_i64("version", record.version)?,
                timestamp_to_db(record.updated_at),
                record.id,
            ],
        )?;
        transaction.commit()?;
        Ok(record)
    }

    fn upsert_thread<F>(&self, thread_ref: ThreadRef, mutate: F) -> StoreResult<ThreadIndexEntry>
    where
        F: FnOnce(&mut ThreadIndexEntry),
    {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let key = u64_to_i64("thread_ref", thread_ref.get())?;
        transaction.execute(
            "INSERT OR IGNORE INTO thread_index (thread_ref) VALUES (?1)",
            params![key],
        )?;
        let mut entry = select_thread(&transaction, key)?;
        mutate(&mut entry);
        transaction.execute(
            r#"
            UPDATE thread_index
            SET namespace = ?1, summary_comment_ref = ?2
            WHERE thread_ref = ?3
            "#,
            params![
                entry.namespace,
                entry
                    .summary_comment_ref
                    .map(|comment| u64_to_i64("summary_comment_ref", comment.get()))
                    .transpose()?,
                key,
            ],
        )?;
        transaction.commit()?;
        Ok(entry)
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn get(&self, id: &str) -> StoreResult<Option<TrackingRecord>> {
        let connection = self.open_connection()?;
        select_entry(&connection, id)
    }

    async fn create(&self, record: TrackingRecord) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = transaction
            .query_row(
                "SELECT 1 FROM entries WHERE id = ?1",
                params![record.id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::AlreadyExists(record.id));
        }

        transaction.execute(
            r#"
            INSERT INTO entries (
                id, command_name, thread_ref, status, args_json, fields_json,
                version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.id,
                record.command_name,
                u64_to_i64("thread_ref", record.thread_ref.get())?,
                record.status.as_str(),
                serde_json::to_string(&record.args)?,
                serde_json::to_string(&record.fields)?,
                u64_to_i64("version", record.version)?,
                timestamp_to_db(record.created_at),
                timestamp_to_db(record.updated_at),
            ],
        )?;
        transaction.commit()?;
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        partial: EntryFields,
        status: Option<EntryStatus>,
    ) -> StoreResult<TrackingRecord> {
        self.apply_update(id, None, partial, status)
    }

    async fn update_if_version(
        &self,
        id: &str,
        expected_version: u64,
        partial: EntryFields,
        status: Option<EntryStatus>,
    ) -> StoreResult<TrackingRecord> {
        self.apply_update(id, Some(expected_version), partial, status)
    }
}

#[async_trait]
impl IssueIndex for SqliteStore {
    async fn ensure(&self, thread_ref: ThreadRef) -> StoreResult<ThreadIndexEntry> {
        let connection = self.open_connection()?;
        let key = u64_to_i64("thread_ref", thread_ref.get())?;
        connection.execute(
            "INSERT OR IGNORE INTO thread_index (thread_ref) VALUES (?1)",
            params![key],
        )?;
        select_thread(&connection, key)
    }

    async fn attach_summary_comment(
        &self,
        thread_ref: ThreadRef,
        comment_ref: CommentRef,
    ) -> StoreResult<ThreadIndexEntry> {
        self.upsert_thread(thread_ref, |entry| {
            entry.summary_comment_ref = Some(comment_ref);
        })
    }

    async fn set_namespace(
        &self,
        thread_ref: ThreadRef,
        namespace: Option<String>,
    ) -> StoreResult<ThreadIndexEntry> {
        self.upsert_thread(thread_ref, |entry| {
            entry.namespace = namespace;
        })
    }
}

type EntryRow = (
    String,
    String,
    i64,
    String,
    String,
    String,
    i64,
    String,
    String,
);

fn select_entry(connection: &Connection, id: &str) -> StoreResult<Option<TrackingRecord>> {
    connection
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
            params![id],
            read_entry_row,
        )
        .optional()?
        .map(decode_entry_row)
        .transpose()
}

fn read_entry_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode_entry_row(
    (id, command_name, thread_ref, status, args_json, fields_json, version, created_at, updated_at): EntryRow,
) -> StoreResult<TrackingRecord> {
    let status = status
        .parse::<EntryStatus>()
        .map_err(|_| StoreError::InvalidPersistedValue {
            field: "status",
            value: status.clone(),
        })?;
    let fields: EntryFields = serde_json::from_str(&fields_json)?;
    Ok(TrackingRecord {
        id,
        command_name,
        thread_ref: ThreadRef(i64_to_u64("thread_ref", thread_ref)?),
        status,
        args: serde_json::from_str(&args_json)?,
        fields,
        version: i64_to_u64("version", version)?,
        created_at: timestamp_from_db(&created_at)?,
        updated_at: timestamp_from_db(&updated_at)?,
    })
}

fn select_thread(connection: &Connection, key: i64) -> StoreResult<ThreadIndexEntry> {
    let (thread_ref, namespace, summary_comment_ref) = connection.query_row(
        "SELECT thread_ref, namespace, summary_comment_ref FROM thread_index WHERE thread_ref = ?1",
        params![key],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        },
    )?;
    Ok(ThreadIndexEntry {
        thread_ref: ThreadRef(i64_to_u64("thread_ref", thread_ref)?),
        namespace,
        summary_comment_ref: summary_comment_ref
            .map(|value| i64_to_u64("summary_comment_ref", value).map(CommentRef))
            .transpose()?,
    })
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn u64_to_i64(field: &'static str, value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

fn i64_to_u64(field: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}
