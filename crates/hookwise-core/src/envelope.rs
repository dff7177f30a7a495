//! Chain-level envelope check for candidate records produced by matchers.
//!
//! This is the first of two validation tiers: it only requires the shared
//! envelope (`id`, plus well-typed `commandName`/`threadRef`/`status` when
//! present). Everything else is carried in a side-channel bag and never
//! enters typed state. The command-specific check runs later, once the
//! owning command is known.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{EntryFields, EntryStatus, ThreadRef, TrackingRecord};

const ENVELOPE_KEYS: &[&str] = &["id", "commandName", "threadRef", "status"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("candidate is not a JSON object")]
    NotAnObject,
    #[error("candidate is missing a non-empty string 'id'")]
    MissingId,
    #[error("candidate field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Required envelope of a tracking record as seen by the matcher chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEnvelope {
    pub id: String,
    pub command_name: Option<String>,
    pub thread_ref: Option<ThreadRef>,
}

/// Envelope plus any extra fields the matcher extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub envelope: RecordEnvelope,
    pub extra: EntryFields,
}

impl CandidateRecord {
    pub fn id(&self) -> &str {
        &self.envelope.id
    }

    /// Describes why this candidate cannot refer to `record`, if it cannot.
    pub fn conflict_with(&self, record: &TrackingRecord) -> Option<String> {
        if let Some(command_name) = &self.envelope.command_name {
            if command_name != &record.command_name {
                return Some(format!(
                    "candidate command '{}' does not match stored command '{}'",
                    command_name, record.command_name
                ));
            }
        }
        if let Some(thread_ref) = self.envelope.thread_ref {
            if thread_ref != record.thread_ref {
                return Some(format!(
                    "candidate thread {} does not match stored thread {}",
                    thread_ref, record.thread_ref
                ));
            }
        }
        None
    }
}

/// Validates a matcher result against the minimal record envelope.
pub fn validate_candidate(value: Value) -> Result<CandidateRecord, EnvelopeError> {
    let Value::Object(mut map) = value else {
        return Err(EnvelopeError::NotAnObject);
    };

    let id = match map.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        _ => return Err(EnvelopeError::MissingId),
    };
    let command_name = optional_string(&map, "commandName")?;
    let thread_ref = optional_thread_ref(&map)?;
    // The stored status is authoritative; a candidate's status only has to be well-formed.
    if let Some(raw) = optional_string(&map, "status")? {
        raw.parse::<EntryStatus>()
            .map_err(|error| EnvelopeError::InvalidField {
                field: "status",
                reason: error.to_string(),
            })?;
    }

    for key in ENVELOPE_KEYS {
        map.remove(*key);
    }

    Ok(CandidateRecord {
        envelope: RecordEnvelope {
            id,
            command_name,
            thread_ref,
        },
        extra: EntryFields::from(map),
    })
}

fn optional_string(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, EnvelopeError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if !value.trim().is_empty() => {
            Ok(Some(value.trim().to_string()))
        }
        Some(other) => Err(EnvelopeError::InvalidField {
            field,
            reason: format!("expected non-empty string, found {other}"),
        }),
    }
}

fn optional_thread_ref(map: &Map<String, Value>) -> Result<Option<ThreadRef>, EnvelopeError> {
    let invalid = |reason: String| EnvelopeError::InvalidField {
        field: "threadRef",
        reason,
    };
    match map.get("threadRef") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(|value| Some(ThreadRef(value)))
            .ok_or_else(|| invalid(format!("expected unsigned integer, found {number}"))),
        Some(Value::String(raw)) => raw
            .trim()
            .trim_start_matches('#')
            .parse::<u64>()
            .map(|value| Some(ThreadRef(value)))
            .map_err(|error| invalid(error.to_string())),
        Some(other) => Err(invalid(format!("expected number, found {other}"))),
    }
}
