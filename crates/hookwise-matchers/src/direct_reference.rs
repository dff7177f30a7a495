use async_trait::async_trait;
use hookwise_core::ExecutionContext;
use serde_json::Value;

use crate::matcher::{EventDelivery, Matcher, MatcherError, MatcherVerdict};

const ENTRY_ID_KEY: &str = "entryId";

/// Recognises payloads that name the tracking id directly under `entryId`.
///
/// The remaining top-level keys are passed through as trigger data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectReferenceMatcher;

#[async_trait]
impl Matcher for DirectReferenceMatcher {
    fn name(&self) -> &'static str {
        "direct-reference"
    }

    async fn handle(
        &self,
        _context: &ExecutionContext,
        event: &Value,
        _delivery: &EventDelivery,
    ) -> Result<MatcherVerdict, MatcherError> {
        let Some(object) = event.as_object() else {
            return Ok(MatcherVerdict::not_applicable("event is not a JSON object"));
        };
        let Some(entry_id) = object.get(ENTRY_ID_KEY) else {
            return Ok(MatcherVerdict::not_applicable("event has no entryId"));
        };
        let entry_id = entry_id
            .as_str()
            .ok_or_else(|| MatcherError::malformed("entryId must be a string"))?;

        let mut candidate = object.clone();
        candidate.remove(ENTRY_ID_KEY);
        candidate.insert("id".to_string(), Value::from(entry_id));
        Ok(MatcherVerdict::Matched(Value::Object(candidate)))
    }
}
