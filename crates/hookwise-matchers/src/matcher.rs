use async_trait::async_trait;
use hookwise_core::ExecutionContext;
use serde_json::Value;
use thiserror::Error;

/// Delivery metadata supplied by the event transport alongside the payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventDelivery {
    pub delivery_id: String,
    /// Event type announced by the transport, used only for logging.
    pub declared_type: Option<String>,
}

impl EventDelivery {
    pub fn new(delivery_id: impl Into<String>) -> Self {
        Self {
            delivery_id: delivery_id.into(),
            ..Self::default()
        }
    }
}

/// Outcome of a matcher that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherVerdict {
    /// Candidate record extracted from the event; envelope not yet checked.
    Matched(Value),
    NotApplicable { reason: String },
}

impl MatcherVerdict {
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self::NotApplicable {
            reason: reason.into(),
        }
    }
}

/// A matcher recognised the event shape but could not extract a candidate.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("malformed event: {message}")]
    Malformed { message: String },
    #[error("failed to decode embedded payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl MatcherError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Heuristic extractor mapping a raw event to a candidate tracking record.
#[async_trait]
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        context: &ExecutionContext,
        event: &Value,
        delivery: &EventDelivery,
    ) -> Result<MatcherVerdict, MatcherError>;
}
