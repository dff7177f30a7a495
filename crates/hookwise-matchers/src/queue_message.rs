use async_trait::async_trait;
use hookwise_core::ExecutionContext;
use serde::Deserialize;
use serde_json::Value;

use crate::matcher::{EventDelivery, Matcher, MatcherError, MatcherVerdict};

const QUEUE_EVENT_SOURCE: &str = "aws:sqs";

#[derive(Debug, Deserialize)]
struct QueueBatch {
    #[serde(rename = "Records")]
    records: Vec<QueueRecord>,
}

#[derive(Debug, Deserialize)]
struct QueueRecord {
    #[serde(rename = "eventSource", default)]
    event_source: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

/// Recognises a queued message whose JSON body is the record envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueMessageMatcher;

#[async_trait]
impl Matcher for QueueMessageMatcher {
    fn name(&self) -> &'static str {
        "queue-message"
    }

    async fn handle(
        &self,
        _context: &ExecutionContext,
        event: &Value,
        _delivery: &EventDelivery,
    ) -> Result<MatcherVerdict, MatcherError> {
        if !event.get("Records").is_some_and(Value::is_array) {
            return Ok(MatcherVerdict::not_applicable("event has no Records batch"));
        }
        let batch: QueueBatch = serde_json::from_value(event.clone())?;
        let Some(record) = batch.records.into_iter().next() else {
            return Ok(MatcherVerdict::not_applicable("Records batch is empty"));
        };
        if record.event_source.as_deref() != Some(QUEUE_EVENT_SOURCE) {
            return Ok(MatcherVerdict::not_applicable(format!(
                "first record source is not {QUEUE_EVENT_SOURCE}"
            )));
        }
        let body = record
            .body
            .ok_or_else(|| MatcherError::malformed("queued message has no body"))?;
        let candidate: Value = serde_json::from_str(&body)?;
        Ok(MatcherVerdict::Matched(candidate))
    }
}
