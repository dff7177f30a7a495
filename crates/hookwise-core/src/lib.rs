//! Shared domain types for the hookwise reconciliation core.
//!
//! Defines the persisted tracking record, the per-thread index row, the
//! chain-level record envelope check, and the explicit execution context
//! handed across every call boundary.

pub mod context;
pub mod envelope;
pub mod record;

pub use context::{Credentials, ExecutionContext};
pub use envelope::{validate_candidate, CandidateRecord, EnvelopeError, RecordEnvelope};
pub use record::{
    CommentRef, EntryFields, EntryStatus, StatusParseError, ThreadIndexEntry, ThreadRef,
    TrackingRecord,
};
