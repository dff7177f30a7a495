use std::sync::Arc;

use async_trait::async_trait;
use hookwise_commands::builtin_registry;
use hookwise_comments::{entry_marker, ThreadApi, ThreadApiError};
use hookwise_core::{
    CommentRef, Credentials, EntryFields, EntryStatus, ExecutionContext, ThreadRef,
    TrackingRecord,
};
use hookwise_matchers::{EventDelivery, MatchDisposition};
use hookwise_reconcile::{DispatchOutcome, ReconcileError, Reconciler, ReconcilerBuilder};
use hookwise_store::{EntryStore, InMemoryStore, IssueIndex, SqliteStore};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

#[derive(Default)]
struct CommentLog {
    next_id: u64,
    created: Vec<(ThreadRef, String)>,
    updated: Vec<(CommentRef, String)>,
}

/// Thread API double that records every publication.
#[derive(Default)]
struct RecordingThreadApi {
    log: AsyncMutex<CommentLog>,
}

impl RecordingThreadApi {
    async fn created(&self) -> Vec<(ThreadRef, String)> {
        self.log.lock().await.created.clone()
    }

    async fn updated(&self) -> Vec<(CommentRef, String)> {
        self.log.lock().await.updated.clone()
    }
}

#[async_trait]
impl ThreadApi for RecordingThreadApi {
    async fn create_comment(
        &self,
        thread: ThreadRef,
        body: &str,
    ) -> Result<CommentRef, ThreadApiError> {
        let mut log = self.log.lock().await;
        log.next_id += 1;
        log.created.push((thread, body.to_string()));
        Ok(CommentRef(5_000 + log.next_id))
    }

    async fn update_comment(&self, comment: CommentRef, body: &str) -> Result<(), ThreadApiError> {
        self.log.lock().await.updated.push((comment, body.to_string()));
        Ok(())
    }
}

fn context() -> ExecutionContext {
    ExecutionContext::new("integration", Credentials::new())
}

fn in_memory_reconciler() -> (Arc<InMemoryStore>, Arc<RecordingThreadApi>, Reconciler) {
    let store = Arc::new(InMemoryStore::new());
    let api = Arc::new(RecordingThreadApi::default());
    let reconciler = ReconcilerBuilder::new(store.clone(), store.clone(), api.clone())
        .registry(builtin_registry().expect("builtin registry"))
        .build();
    (store, api, reconciler)
}

fn sns_notification(message: Value) -> Value {
    json!({
        "Records": [{
            "EventSource": "aws:sns",
            "EventVersion": "1.0",
            "Sns": {
                "Type": "Notification",
                "MessageId": "6a1f",
                "Message": message.to_string(),
            }
        }]
    })
}

#[tokio::test]
async fn integration_unrecognised_event_is_silent_and_writes_nothing() {
    let (store, api, reconciler) = in_memory_reconciler();
    let event = json!({ "zen": "Keep it logically awesome.", "hook_id": 7 });

    let outcome = reconciler
        .dispatch(&context(), &event, &EventDelivery::new("delivery-a"))
        .await
        .expect("dispatch returns normally");

    let DispatchOutcome::Unmatched(report) = outcome else {
        panic!("event should not match");
    };
    assert_eq!(report.attempted(), 4);
    assert!(report.is_unmatched());
    assert!(report
        .attempts
        .iter()
        .all(|attempt| matches!(attempt.disposition, MatchDisposition::NotApplicable { .. })));
    assert!(report.event_summary.contains("hook_id"));
    assert_eq!(store.entry_count().await, 0);
    assert_eq!(store.thread_count().await, 0);
    assert!(api.created().await.is_empty());
    assert!(api.updated().await.is_empty());
}

#[tokio::test]
async fn integration_third_matcher_reconciles_and_updates_existing_comment() {
    let (store, api, reconciler) = in_memory_reconciler();
    store
        .create(TrackingRecord::new(
            "abc-123",
            "lighthouse",
            ThreadRef(77),
            vec!["https://example.com".to_string()],
        ))
        .await
        .expect("seed record");
    store
        .attach_summary_comment(ThreadRef(77), CommentRef(4_242))
        .await
        .expect("seed summary comment");

    let event = sns_notification(json!({ "id": "abc-123", "score": 92 }));
    let outcome = reconciler
        .dispatch(&context(), &event, &EventDelivery::new("delivery-b"))
        .await
        .expect("dispatch");

    let DispatchOutcome::Reconciled { report, outcome } = outcome else {
        panic!("event should match");
    };
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.attempts[2].matcher, "pubsub-notification");
    assert_eq!(report.attempts[2].disposition, MatchDisposition::Matched);
    assert_eq!(outcome.status, EntryStatus::Success);
    assert_eq!(outcome.comment, CommentRef(4_242));

    let stored = store.get("abc-123").await.expect("get").expect("stored");
    assert_eq!(stored.status, EntryStatus::Success);
    assert_eq!(stored.fields.get("score"), Some(&json!(92)));
    assert_eq!(stored.fields.get("url"), Some(&json!("https://example.com")));
    assert_eq!(stored.version, 2);

    assert!(api.created().await.is_empty());
    let updated = api.updated().await;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0, CommentRef(4_242));
    assert!(updated[0].1.contains("**92** passes"));
    assert!(updated[0].1.contains(&entry_marker("abc-123")));
}

#[tokio::test]
async fn integration_unknown_command_fails_without_touching_record() {
    let (store, _api, reconciler) = in_memory_reconciler();
    let record = TrackingRecord::new("ghost-1", "nonexistent", ThreadRef(3), Vec::new())
        .with_fields(EntryFields::new().with("note", "keep me"));
    store.create(record.clone()).await.expect("seed");

    let error = reconciler
        .re_evaluate_and_update(&context(), &record, None)
        .await
        .expect_err("unknown command");

    assert!(matches!(
        error,
        ReconcileError::UnknownCommand { ref entry_id, ref command }
            if entry_id == "ghost-1" && command == "nonexistent"
    ));
    let stored = store.get("ghost-1").await.expect("get").expect("stored");
    assert_eq!(stored, record);
}

#[tokio::test]
async fn integration_sqlite_state_survives_restart_and_reuses_summary_comment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("state").join("hookwise.sqlite");
    let api = Arc::new(RecordingThreadApi::default());

    let entry_id = {
        let store = Arc::new(SqliteStore::new(&db_path).expect("open store"));
        let reconciler = ReconcilerBuilder::new(store.clone(), store, api.clone())
            .registry(builtin_registry().expect("builtin registry"))
            .build();
        let outcome = reconciler
            .invoke_command(
                &context(),
                "lighthouse",
                ThreadRef(19),
                vec!["https://example.com".to_string()],
            )
            .await
            .expect("invoke");
        assert_eq!(outcome.status, EntryStatus::Success);
        assert!(outcome
            .rendered_comment
            .starts_with("### `lighthouse` awaiting score"));
        assert!(outcome.rendered_comment.contains("Waiting for the audit"));
        outcome.entry_id
    };

    let store = Arc::new(SqliteStore::new(&db_path).expect("reopen store"));
    let reconciler = ReconcilerBuilder::new(store.clone(), store.clone(), api.clone())
        .registry(builtin_registry().expect("builtin registry"))
        .build();
    let event = json!({ "entryId": entry_id, "score": 0.81 });
    let outcome = reconciler
        .dispatch(&context(), &event, &EventDelivery::new("delivery-c"))
        .await
        .expect("dispatch");
    let DispatchOutcome::Reconciled { outcome, .. } = outcome else {
        panic!("direct reference should match");
    };

    assert_eq!(outcome.status, EntryStatus::Failure);
    let stored = store.get(&entry_id).await.expect("get").expect("stored");
    assert_eq!(stored.fields.get("score"), Some(&json!(81)));
    assert_eq!(stored.fields.get("minScore"), Some(&json!(90)));

    let created = api.created().await;
    assert_eq!(created.len(), 1);
    let updated = api.updated().await;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0, outcome.comment);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_concurrent_disjoint_updates_are_additive() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteStore::new(temp.path().join("state.sqlite")).expect("open store"));
    store
        .create(TrackingRecord::new("merge-1", "ping", ThreadRef(1), Vec::new()))
        .await
        .expect("seed");

    let mut handles = Vec::new();
    for index in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .update(
                    "merge-1",
                    EntryFields::new().with(format!("key{index}"), index),
                    None,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("update");
    }

    let stored = store.get("merge-1").await.expect("get").expect("stored");
    assert_eq!(stored.fields.len(), 8);
    for index in 0..8 {
        assert_eq!(
            stored.fields.get(&format!("key{index}")),
            Some(&json!(index))
        );
    }
    assert_eq!(stored.version, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_concurrent_ensure_returns_one_thread_row() {
    let store = Arc::new(InMemoryStore::new());
    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.ensure(ThreadRef(64)).await })
    };
    let second = {
        let store = store.clone();
        tokio::spawn(async move { store.ensure(ThreadRef(64)).await })
    };

    let first = first.await.expect("join").expect("ensure");
    let second = second.await.expect("join").expect("ensure");
    assert_eq!(first.thread_ref, second.thread_ref);
    assert_eq!(store.thread_count().await, 1);
}

#[tokio::test]
async fn regression_mismatched_thread_in_candidate_is_not_reconciled() {
    let (store, api, reconciler) = in_memory_reconciler();
    let record = TrackingRecord::new("pinned-1", "ping", ThreadRef(10), Vec::new());
    store.create(record.clone()).await.expect("seed");

    let event = json!({ "entryId": "pinned-1", "threadRef": 11 });
    let outcome = reconciler
        .dispatch(&context(), &event, &EventDelivery::new("delivery-d"))
        .await
        .expect("dispatch");

    let DispatchOutcome::Unmatched(report) = outcome else {
        panic!("conflicting candidate must not match");
    };
    assert!(matches!(
        report.attempts[3].disposition,
        MatchDisposition::Conflict { .. }
    ));
    assert_eq!(store.get("pinned-1").await.expect("get"), Some(record));
    assert!(api.created().await.is_empty());
}

#[tokio::test]
async fn regression_undecodable_sqlite_row_is_reported_as_validation_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("state.sqlite");
    let store = Arc::new(SqliteStore::new(&db_path).expect("open store"));
    store
        .create(TrackingRecord::new("x1", "ping", ThreadRef(2), Vec::new()))
        .await
        .expect("seed");
    let connection = rusqlite::Connection::open(&db_path).expect("open raw connection");
    connection
        .execute("UPDATE entries SET fields_json = '[1]' WHERE id = 'x1'", [])
        .expect("corrupt row");

    let api = Arc::new(RecordingThreadApi::default());
    let reconciler = ReconcilerBuilder::new(store.clone(), store, api.clone())
        .registry(builtin_registry().expect("builtin registry"))
        .build();

    let error = reconciler
        .lookup_and_re_evaluate(&context(), "x1")
        .await
        .expect_err("undecodable row");
    assert!(matches!(
        error,
        ReconcileError::ValidationFailed { ref entry_id, command: None, .. } if entry_id == "x1"
    ));

    let outcome = reconciler
        .dispatch(
            &context(),
            &json!({ "entryId": "x1" }),
            &EventDelivery::new("delivery-e"),
        )
        .await
        .expect("poisoned candidate is a non-match");
    let DispatchOutcome::Unmatched(report) = outcome else {
        panic!("poisoned record must not be reconciled");
    };
    assert!(matches!(
        report.attempts[3].disposition,
        MatchDisposition::PoisonedEntry { .. }
    ));

    let fields_json: String = connection
        .query_row("SELECT fields_json FROM entries WHERE id = 'x1'", [], |row| {
            row.get(0)
        })
        .expect("read raw row");
    assert_eq!(fields_json, "[1]");
    assert!(api.created().await.is_empty());
}
