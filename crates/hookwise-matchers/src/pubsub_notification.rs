use async_trait::async_trait;
use hookwise_core::ExecutionContext;
use serde::Deserialize;
use serde_json::Value;

use crate::matcher::{EventDelivery, Matcher, MatcherError, MatcherVerdict};

const NOTIFICATION_EVENT_SOURCE: &str = "aws:sns";

#[derive(Debug, Deserialize)]
struct NotificationBatch {
    #[serde(rename = "Records")]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    #[serde(rename = "EventSource", default)]
    event_source: Option<String>,
    #[serde(rename = "Sns", default)]
    sns: Option<NotificationMessage>,
}

#[derive(Debug, Deserialize)]
struct NotificationMessage {
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "Subject", default)]
    subject: Option<String>,
}

/// Recognises a pub/sub notification whose message is the record envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct PubSubNotificationMatcher;

#[async_trait]
impl Matcher for PubSubNotificationMatcher {
    fn name(&self) -> &'static str {
        "pubsub-notification"
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
        let batch: NotificationBatch = serde_json::from_value(event.clone())?;
        let Some(record) = batch.records.into_iter().next() else {
            return Ok(MatcherVerdict::not_applicable("Records batch is empty"));
        };
        if record.event_source.as_deref() != Some(NOTIFICATION_EVENT_SOURCE) {
            return Ok(MatcherVerdict::not_applicable(format!(
                "first record source is not {NOTIFICATION_EVENT_SOURCE}"
            )));
        }
        let notification = record
            .sns
            .ok_or_else(|| MatcherError::malformed("notification record has no Sns object"))?;
        let message = notification
            .message
            .ok_or_else(|| MatcherError::malformed("notification has no Message"))?;
        let mut candidate: Value = serde_json::from_str(&message)?;
        if let (Some(subject), Some(object)) = (notification.subject, candidate.as_object_mut()) {
            object
                .entry("subject")
                .or_insert_with(|| Value::String(subject));
        }
        Ok(MatcherVerdict::Matched(candidate))
    }
}
