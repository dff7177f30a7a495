//! Event recognition for hookwise.
//!
//! A [`MatcherChain`] tries each registered [`Matcher`] in declaration order
//! against a raw event. The first verdict that passes envelope validation and
//! resolves to a stored record wins; everything else is logged and skipped.

mod build_state_change;
mod chain;
mod direct_reference;
mod matcher;
mod pubsub_notification;
mod queue_message;

pub use build_state_change::{BuildStateChangeMatcher, ENTRY_ID_VARIABLE};
pub use chain::{
    builtin_matchers, summarize_event, MatchDisposition, MatchedEvent, MatcherAttempt,
    MatcherChain, MatcherChainReport, EVENT_SUMMARY_MAX_CHARS,
};
pub use direct_reference::DirectReferenceMatcher;
pub use matcher::{EventDelivery, Matcher, MatcherError, MatcherVerdict};
pub use pubsub_notification::PubSubNotificationMatcher;
pub use queue_message::QueueMessageMatcher;
