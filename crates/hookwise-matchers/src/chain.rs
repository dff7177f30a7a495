use std::sync::Arc;

use hookwise_core::{validate_candidate, EntryFields, ExecutionContext, TrackingRecord};
use hookwise_store::{EntryStore, StoreResult};
use serde_json::Value;

use crate::build_state_change::BuildStateChangeMatcher;
use crate::direct_reference::DirectReferenceMatcher;
use crate::matcher::{EventDelivery, Matcher, MatcherVerdict};
use crate::pubsub_notification::PubSubNotificationMatcher;
use crate::queue_message::QueueMessageMatcher;

pub const EVENT_SUMMARY_MAX_CHARS: usize = 200;

/// What happened when one matcher was tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDisposition {
    Matched,
    NotApplicable { reason: String },
    Failed { error: String },
    RejectedEnvelope { reason: String },
    UnknownEntry { id: String },
    /// The stored record exists but cannot be decoded.
    PoisonedEntry { id: String, reason: String },
    Conflict { reason: String },
}

impl MatchDisposition {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherAttempt {
    pub matcher: String,
    pub disposition: MatchDisposition,
}

/// The stored record an event resolved to, plus the data it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedEvent {
    pub matcher: String,
    pub record: TrackingRecord,
    /// Non-envelope fields of the candidate; never persisted directly.
    pub trigger_fields: EntryFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatcherChainReport {
    pub delivery_id: String,
    pub event_summary: String,
    pub attempts: Vec<MatcherAttempt>,
    pub matched: Option<MatchedEvent>,
}

impl MatcherChainReport {
    pub fn attempted(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_unmatched(&self) -> bool {
        self.matched.is_none()
    }
}

/// Ordered, first-match-wins list of matchers.
#[derive(Clone, Default)]
pub struct MatcherChain {
    matchers: Vec<Arc<dyn Matcher>>,
}

impl MatcherChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matcher<M>(mut self, matcher: M) -> Self
    where
        M: Matcher + 'static,
    {
        self.matchers.push(Arc::new(matcher));
        self
    }

    pub fn push(&mut self, matcher: Arc<dyn Matcher>) {
        self.matchers.push(matcher);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|matcher| matcher.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Runs matchers in declaration order until one resolves to a stored record.
    ///
    /// Matcher errors, envelope violations, unknown ids and envelope conflicts
    /// are logged and skipped. Only store failures abort the run.
    pub async fn run(
        &self,
        context: &ExecutionContext,
        event: &Value,
        delivery: &EventDelivery,
        entries: &dyn EntryStore,
    ) -> StoreResult<MatcherChainReport> {
        let event_summary = summarize_event(event);
        let mut report = MatcherChainReport {
            delivery_id: delivery.delivery_id.clone(),
            event_summary,
            attempts: Vec::with_capacity(self.matchers.len()),
            matched: None,
        };

        for matcher in &self.matchers {
            let name = matcher.name();
            let disposition = match matcher.handle(context, event, delivery).await {
                Ok(MatcherVerdict::Matched(candidate)) => {
                    match resolve_candidate(name, candidate, entries).await? {
                        Ok(matched) => {
                            report.matched = Some(matched);
                            MatchDisposition::Matched
                        }
                        Err(disposition) => disposition,
                    }
                }
                Ok(MatcherVerdict::NotApplicable { reason }) => {
                    MatchDisposition::NotApplicable { reason }
                }
                Err(error) => MatchDisposition::Failed {
                    error: error.to_string(),
                },
            };
            log_disposition(name, &disposition, &report);
            report.attempts.push(MatcherAttempt {
                matcher: name.to_string(),
                disposition,
            });
            if report.matched.is_some() {
                return Ok(report);
            }
        }

        tracing::info!(
            delivery_id = %report.delivery_id,
            declared_type = delivery.declared_type.as_deref().unwrap_or(""),
            attempted = report.attempts.len(),
            event_summary = %report.event_summary,
            "event not recognised by any matcher"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for MatcherChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatcherChain")
            .field("matchers", &self.names())
            .finish()
    }
}

async fn resolve_candidate(
    matcher: &str,
    candidate: Value,
    entries: &dyn EntryStore,
) -> StoreResult<Result<MatchedEvent, MatchDisposition>> {
    let candidate = match validate_candidate(candidate) {
        Ok(candidate) => candidate,
        Err(error) => {
            return Ok(Err(MatchDisposition::RejectedEnvelope {
                reason: error.to_string(),
            }))
        }
    };
    let record = match entries.get(candidate.id()).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return Ok(Err(MatchDisposition::UnknownEntry {
                id: candidate.id().to_string(),
            }))
        }
        Err(error) if error.is_corrupt() => {
            return Ok(Err(MatchDisposition::PoisonedEntry {
                id: candidate.id().to_string(),
                reason: error.to_string(),
            }))
        }
        Err(error) => return Err(error),
    };
    if let Some(reason) = candidate.conflict_with(&record) {
        return Ok(Err(MatchDisposition::Conflict { reason }));
    }
    Ok(Ok(MatchedEvent {
        matcher: matcher.to_string(),
        record,
        trigger_fields: candidate.extra,
    }))
}

fn log_disposition(matcher: &str, disposition: &MatchDisposition, report: &MatcherChainReport) {
    let delivery_id = report.delivery_id.as_str();
    let event_summary = report.event_summary.as_str();
    match disposition {
        MatchDisposition::Matched => {
            if let Some(matched) = &report.matched {
                tracing::info!(
                    matcher,
                    delivery_id,
                    entry_id = %matched.record.id,
                    command = %matched.record.command_name,
                    "event matched tracking record"
                );
            }
        }
        MatchDisposition::NotApplicable { reason }
        | MatchDisposition::RejectedEnvelope { reason }
        | MatchDisposition::Conflict { reason } => {
            tracing::info!(
                matcher,
                delivery_id,
                reason = %reason,
                event_summary,
                "matcher did not match"
            );
        }
        MatchDisposition::UnknownEntry { id } => {
            tracing::info!(
                matcher,
                delivery_id,
                reason = "no stored record",
                entry_id = %id,
                event_summary,
                "matcher did not match"
            );
        }
        MatchDisposition::PoisonedEntry { id, reason } => {
            tracing::warn!(
                matcher,
                delivery_id,
                entry_id = %id,
                reason = %reason,
                event_summary,
                "stored record is unreadable, skipping candidate"
            );
        }
        MatchDisposition::Failed { error } => {
            tracing::info!(
                matcher,
                delivery_id,
                error = %error,
                event_summary,
                "matcher failed"
            );
        }
    }
}

/// Chain with the built-in matchers in declaration order.
pub fn builtin_matchers() -> MatcherChain {
    MatcherChain::new()
        .with_matcher(BuildStateChangeMatcher)
        .with_matcher(QueueMessageMatcher)
        .with_matcher(PubSubNotificationMatcher)
        .with_matcher(DirectReferenceMatcher)
}

/// One-line bounded description of a raw event for log fields.
pub fn summarize_event(event: &Value) -> String {
    let summary = match event {
        Value::Object(object) => {
            let mut keys = object.keys().map(String::as_str).collect::<Vec<_>>();
            keys.sort_unstable();
            let mut summary = format!("keys=[{}]", keys.join(","));
            for field in ["source", "detail-type"] {
                if let Some(value) = object.get(field).and_then(Value::as_str) {
                    summary.push_str(&format!(" {field}={value}"));
                }
            }
            if let Some(records) = object.get("Records").and_then(Value::as_array) {
                summary.push_str(&format!(" records={}", records.len()));
            }
            summary
        }
        Value::Array(items) => format!("array len={}", items.len()),
        Value::Null => "null".to_string(),
        other => format!("scalar {other}"),
    };
    truncate_chars(summary.replace(['\n', '\r'], " "), EVENT_SUMMARY_MAX_CHARS)
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut truncated = text
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::{builtin_matchers, summarize_event, MatchDisposition, MatcherChain};
    use crate::matcher::{EventDelivery, Matcher, MatcherError, MatcherVerdict};
    use async_trait::async_trait;
    use hookwise_core::{
        Credentials, EntryFields, EntryStatus, ExecutionContext, ThreadRef, TrackingRecord,
    };
    use hookwise_store::{EntryStore, InMemoryStore, StoreError, StoreResult};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Skip,
        Fail,
        Yield(Value),
    }

    struct ScriptedMatcher {
        name: &'static str,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedMatcher {
        fn new(name: &'static str, behaviour: Behaviour) -> Self {
            Self {
                name,
                behaviour,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Matcher for ScriptedMatcher {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(
            &self,
            _context: &ExecutionContext,
            _event: &Value,
            _delivery: &EventDelivery,
        ) -> Result<MatcherVerdict, MatcherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Skip => Ok(MatcherVerdict::not_applicable("scripted skip")),
                Behaviour::Fail => Err(MatcherError::malformed("scripted failure")),
                Behaviour::Yield(value) => Ok(MatcherVerdict::Matched(value.clone())),
            }
        }
    }

    /// Delegates to an in-memory store but fails to decode one id.
    struct UnreadableEntryStore {
        inner: InMemoryStore,
        unreadable_id: &'static str,
    }

    #[async_trait]
    impl EntryStore for UnreadableEntryStore {
        async fn get(&self, id: &str) -> StoreResult<Option<TrackingRecord>> {
            if id == self.unreadable_id {
                return Err(StoreError::InvalidPersistedValue {
                    field: "fields_json",
                    value: "[1]".to_string(),
                });
            }
            self.inner.get(id).await
        }

        async fn create(&self, record: TrackingRecord) -> StoreResult<()> {
            self.inner.create(record).await
        }

        async fn update(
            &self,
            id: &str,
            partial: EntryFields,
            status: Option<EntryStatus>,
        ) -> StoreResult<TrackingRecord> {
            self.inner.update(id, partial, status).await
        }

        async fn update_if_version(
            &self,
            id: &str,
            expected_version: u64,
            partial: EntryFields,
            status: Option<EntryStatus>,
        ) -> StoreResult<TrackingRecord> {
            self.inner
                .update_if_version(id, expected_version, partial, status)
                .await
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new("test", Credentials::new())
    }

    async fn store_with(record: TrackingRecord) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.create(record).await.expect("create");
        store
    }

    #[tokio::test]
    async fn functional_failing_matchers_never_abort_the_chain() {
        let store = store_with(TrackingRecord::new(
            "abc-123",
            "lighthouse",
            ThreadRef(42),
            Vec::new(),
        ))
        .await;
        let trailing = ScriptedMatcher::new("after", Behaviour::Skip);
        let trailing_calls = trailing.calls.clone();
        let chain = MatcherChain::new()
            .with_matcher(ScriptedMatcher::new("first", Behaviour::Fail))
            .with_matcher(ScriptedMatcher::new("second", Behaviour::Skip))
            .with_matcher(ScriptedMatcher::new(
                "third",
                Behaviour::Yield(json!({ "id": "abc-123", "score": 92 })),
            ))
            .with_matcher(trailing);

        let report = chain
            .run(&context(), &json!({}), &EventDelivery::new("d-1"), &store)
            .await
            .expect("run");

        let names = report
            .attempts
            .iter()
            .map(|attempt| attempt.matcher.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert!(matches!(
            report.attempts[0].disposition,
            MatchDisposition::Failed { .. }
        ));
        let matched = report.matched.expect("matched");
        assert_eq!(matched.matcher, "third");
        assert_eq!(matched.record.id, "abc-123");
        assert_eq!(matched.trigger_fields.get("score"), Some(&json!(92)));
        assert_eq!(trailing_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn regression_unreadable_stored_record_is_skipped_not_fatal() {
        let store = UnreadableEntryStore {
            inner: store_with(TrackingRecord::new(
                "good-1",
                "ping",
                ThreadRef(3),
                Vec::new(),
            ))
            .await,
            unreadable_id: "bad-1",
        };
        let chain = MatcherChain::new()
            .with_matcher(ScriptedMatcher::new(
                "poisoned",
                Behaviour::Yield(json!({ "id": "bad-1" })),
            ))
            .with_matcher(ScriptedMatcher::new(
                "healthy",
                Behaviour::Yield(json!({ "id": "good-1" })),
            ));

        let report = chain
            .run(&context(), &json!({}), &EventDelivery::new("d-9"), &store)
            .await
            .expect("unreadable record does not abort the chain");

        assert!(matches!(
            report.attempts[0].disposition,
            MatchDisposition::PoisonedEntry { ref id, .. } if id == "bad-1"
        ));
        assert_eq!(report.matched.expect("matched").record.id, "good-1");
    }

    #[tokio::test]
    async fn functional_envelope_rejections_and_unknown_ids_continue_the_chain() {
        let store = store_with(TrackingRecord::new(
            "abc-123",
            "lighthouse",
            ThreadRef(42),
            Vec::new(),
        ))
        .await;
        let chain = MatcherChain::new()
            .with_matcher(ScriptedMatcher::new(
                "no-id",
                Behaviour::Yield(json!({ "score": 1 })),
            ))
            .with_matcher(ScriptedMatcher::new(
                "unknown",
                Behaviour::Yield(json!({ "id": "missing" })),
            ))
            .with_matcher(ScriptedMatcher::new(
                "wrong-thread",
                Behaviour::Yield(json!({ "id": "abc-123", "threadRef": 7 })),
            ))
            .with_matcher(ScriptedMatcher::new(
                "good",
                Behaviour::Yield(json!({ "id": "abc-123", "threadRef": "#42" })),
            ));

        let report = chain
            .run(&context(), &json!({}), &EventDelivery::new("d-2"), &store)
            .await
            .expect("run");
        let dispositions = report
            .attempts
            .iter()
            .map(|attempt| attempt.disposition.clone())
            .collect::<Vec<_>>();
        assert!(matches!(
            dispositions[0],
            MatchDisposition::RejectedEnvelope { .. }
        ));
        assert_eq!(
            dispositions[1],
            MatchDisposition::UnknownEntry {
                id: "missing".into()
            }
        );
        assert!(matches!(dispositions[2], MatchDisposition::Conflict { .. }));
        assert!(dispositions[3].is_match());
    }

    #[tokio::test]
    async fn integration_builtin_chain_reports_every_attempt_when_unmatched() {
        let store = InMemoryStore::new();
        let chain = builtin_matchers();
        let report = chain
            .run(
                &context(),
                &json!({ "source": "aws.ec2", "detail-type": "EC2 Instance State-change" }),
                &EventDelivery::new("d-3"),
                &store,
            )
            .await
            .expect("run");
        assert!(report.is_unmatched());
        assert_eq!(report.attempted(), chain.len());
        assert_eq!(
            chain.names(),
            vec![
                "build-state-change",
                "queue-message",
                "pubsub-notification",
                "direct-reference"
            ]
        );
        assert_eq!(store.entry_count().await, 0);
    }

    #[test]
    fn unit_summarize_event_is_bounded_and_single_line() {
        let summary = summarize_event(&json!({
            "source": "aws.codebuild",
            "detail-type": "CodeBuild Build State Change",
            "detail": {}
        }));
        assert_eq!(
            summary,
            "keys=[detail,detail-type,source] source=aws.codebuild detail-type=CodeBuild Build State Change"
        );

        let long_key = "k\n".repeat(300);
        let summary = summarize_event(&json!({ long_key: 1 }));
        assert_eq!(summary.chars().count(), super::EVENT_SUMMARY_MAX_CHARS);
        assert!(!summary.contains('\n'));
        assert!(summary.ends_with("..."));
    }
}
