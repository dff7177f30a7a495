//! Reconciliation orchestrator for hookwise.
//!
//! Ties the matcher chain, command registry, entry store and thread API
//! together behind three entry points: event dispatch, direct command
//! invocation and administrative re-runs by tracking id.

mod error;
mod publisher;
mod reconciler;


pub use error::ReconcileError;
pub use publisher::SummaryCommentPublisher;
pub use reconciler::{DispatchOutcome, ReconcileOutcome, Reconciler, ReconcilerBuilder};
