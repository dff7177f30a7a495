//! Entry store and issue index abstractions with in-memory backend.
//!
//! `EntryStore` holds tracking records keyed by their unique id and merges
//! partial field updates. `IssueIndex` holds per-thread bookkeeping with
//! get-or-create semantics. Both are implemented in memory here and durably
//! by [`SqliteStore`].

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

mod sqlite;

pub use hookwise_core::{
    CommentRef, EntryFields, EntryStatus, ThreadIndexEntry, ThreadRef, TrackingRecord,
};
pub use sqlite::SqliteStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry '{0}' not found")]
    NotFound(String),
    #[error("entry '{0}' already exists")]
    AlreadyExists(String),
    #[error("entry '{id}' version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: u64,
        actual: u64,
    },
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true when the caller may retry the operation with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Io(_))
    }

    /// Returns true when persisted data could not be decoded.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::InvalidPersistedValue { .. } | Self::Json(_) | Self::Chrono(_)
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                ) =>
            {
                Self::Unavailable {
                    message: error.to_string(),
                }
            }
            _ => Self::Sqlite(error),
        }
    }
}

/// Durable keyed storage for tracking records.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Returns the record for `id`, or `None` when absent.
    async fn get(&self, id: &str) -> StoreResult<Option<TrackingRecord>>;

    /// Stores a new record, rejecting ids that already exist.
    async fn create(&self, record: TrackingRecord) -> StoreResult<()>;

    /// Merges `partial` into the stored fields, optionally replacing the
    /// status, and returns the updated record.
    async fn update(
        &self,
        id: &str,
        partial: EntryFields,
        status: Option<EntryStatus>,
    ) -> StoreResult<TrackingRecord>;

    /// Same as [`EntryStore::update`] but only applies when the stored
    /// version equals `expected_version`.
    async fn update_if_version(
        &self,
        id: &str,
        expected_version: u64,
        partial: EntryFields,
        status: Option<EntryStatus>,
    ) -> StoreResult<TrackingRecord>;
}

/// Secondary storage mapping a thread to its bookkeeping row.
#[async_trait]
pub trait IssueIndex: Send + Sync {
    /// Returns the row for `thread_ref`, creating an empty one if needed.
    async fn ensure(&self, thread_ref: ThreadRef) -> StoreResult<ThreadIndexEntry>;

    /// Records the thread's summary comment, replacing any previous one.
    async fn attach_summary_comment(
        &self,
        thread_ref: ThreadRef,
        comment_ref: CommentRef,
    ) -> StoreResult<ThreadIndexEntry>;

    /// Sets or clears the thread's classification tag.
    async fn set_namespace(
        &self,
        thread_ref: ThreadRef,
        namespace: Option<String>,
    ) -> StoreResult<ThreadIndexEntry>;
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<String, TrackingRecord>,
    threads: HashMap<ThreadRef, ThreadIndexEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tracking records.
    pub async fn entry_count(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Number of stored thread rows.
    pub async fn thread_count(&self) -> usize {
        self.inner.read().await.threads.len()
    }
}

#[async_trait]
impl EntryStore for InMemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Option<TrackingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.entries.get(id).cloned())
    }

    async fn create(&self, record: TrackingRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.entries.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        inner.entries.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        partial: EntryFields,
        status: Option<EntryStatus>,
    ) -> StoreResult<TrackingRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.apply_update(partial, status);
        Ok(record.clone())
    }

    async fn update_if_version(
        &self,
        id: &str,
        expected_version: u64,
        partial: EntryFields,
        status: Option<EntryStatus>,
    ) -> StoreResult<TrackingRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: record.version,
            });
        }
        record.apply_update(partial, status);
        Ok(record.clone())
    }
}

#[async_trait]
impl IssueIndex for InMemoryStore {
    async fn ensure(&self, thread_ref: ThreadRef) -> StoreResult<ThreadIndexEntry> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .threads
            .entry(thread_ref)
            .or_insert_with(|| ThreadIndexEntry::new(thread_ref))
            .clone();
        Ok(entry)
    }

    async fn attach_summary_comment(
        &self,
        thread_ref: ThreadRef,
        comment_ref: CommentRef,
    ) -> StoreResult<ThreadIndexEntry> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .threads
            .entry(thread_ref)
            .or_insert_with(|| ThreadIndexEntry::new(thread_ref));
        entry.summary_comment_ref = Some(comment_ref);
        Ok(entry.clone())
    }

    async fn set_namespace(
        &self,
        thread_ref: ThreadRef,
        namespace: Option<String>,
    ) -> StoreResult<ThreadIndexEntry> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .threads
            .entry(thread_ref)
            .or_insert_with(|| ThreadIndexEntry::new(thread_ref));
        entry.namespace = namespace;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CommentRef, EntryFields, EntryStatus, EntryStore, InMemoryStore, IssueIndex, StoreError,
        ThreadRef, TrackingRecord,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn record(id: &str) -> TrackingRecord {
        TrackingRecord::new(id, "lighthouse", ThreadRef(42), vec!["https://x".into()])
    }

    #[tokio::test]
    async fn unit_get_returns_none_for_missing_entry() {
        let store = InMemoryStore::new();
        assert!(store.get("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn functional_sequential_updates_merge_fields() {
        let store = InMemoryStore::new();
        store.create(record("abc")).await.expect("create");

        store
            .update("abc", EntryFields::new().with("a", 1), None)
            .await
            .expect("first update");
        let updated = store
            .update("abc", EntryFields::new().with("b", 2), None)
            .await
            .expect("second update");

        assert_eq!(updated.fields.to_value(), json!({ "a": 1, "b": 2 }));
        assert_eq!(updated.version, 3);
        let stored = store.get("abc").await.expect("get").expect("record");
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn functional_update_overrides_status_non_monotonically() {
        let store = InMemoryStore::new();
        store.create(record("abc")).await.expect("create");
        store
            .update("abc", EntryFields::new(), Some(EntryStatus::Success))
            .await
            .expect("success");
        let updated = store
            .update("abc", EntryFields::new(), Some(EntryStatus::Failure))
            .await
            .expect("failure");
        assert_eq!(updated.status, EntryStatus::Failure);
    }

    #[tokio::test]
    async fn regression_create_rejects_existing_id_and_update_rejects_missing() {
        let store = InMemoryStore::new();
        store.create(record("abc")).await.expect("create");
        assert!(matches!(
            store.create(record("abc")).await,
            Err(StoreError::AlreadyExists(id)) if id == "abc"
        ));
        assert!(matches!(
            store.update("nope", EntryFields::new(), None).await,
            Err(StoreError::NotFound(id)) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn regression_update_if_version_rejects_stale_stamp() {
        let store = InMemoryStore::new();
        store.create(record("abc")).await.expect("create");
        store
            .update_if_version("abc", 1, EntryFields::new().with("a", 1), None)
            .await
            .expect("fresh stamp applies");
        let conflict = store
            .update_if_version("abc", 1, EntryFields::new().with("a", 2), None)
            .await
            .expect_err("stale stamp rejected");
        assert!(matches!(
            conflict,
            StoreError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        let stored = store.get("abc").await.expect("get").expect("record");
        assert_eq!(stored.fields.get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn functional_ensure_is_idempotent_under_concurrency() {
        let store = Arc::new(InMemoryStore::new());
        let (left, right) = tokio::join!(
            {
                let store = store.clone();
                async move { store.ensure(ThreadRef(7)).await }
            },
            {
                let store = store.clone();
                async move { store.ensure(ThreadRef(7)).await }
            }
        );
        let left = left.expect("left ensure");
        let right = right.expect("right ensure");
        assert_eq!(left.thread_ref, right.thread_ref);
        assert_eq!(store.thread_count().await, 1);
    }

    #[tokio::test]
    async fn functional_attach_summary_comment_overwrites_and_keeps_namespace() {
        let store = InMemoryStore::new();
        store
            .set_namespace(ThreadRef(9), Some("pull_request".into()))
            .await
            .expect("namespace");
        store
            .attach_summary_comment(ThreadRef(9), CommentRef(1))
            .await
            .expect("attach first");
        let entry = store
            .attach_summary_comment(ThreadRef(9), CommentRef(2))
            .await
            .expect("attach second");
        assert_eq!(entry.summary_comment_ref, Some(CommentRef(2)));
        assert_eq!(entry.namespace.as_deref(), Some("pull_request"));
        let ensured = store.ensure(ThreadRef(9)).await.expect("ensure");
        assert_eq!(ensured, entry);
    }
}
