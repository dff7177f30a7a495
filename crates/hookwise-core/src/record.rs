//! Tracking records and thread index rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error returned when a persisted or inbound status string is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entry status '{0}'")]
pub struct StatusParseError(pub String);

/// Evaluation state of a tracking record.
///
/// Only `Pending` is special: it is assigned on creation and never produced
/// by an evaluation. The remaining states are freely re-enterable, because the
/// displayed status always reflects the latest evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Pending,
    Success,
    Failure,
    Error,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = StatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "error" => Ok(Self::Error),
            _ => Err(StatusParseError(value.to_string())),
        }
    }
}

/// Numeric identifier of a collaboration thread (issue or pull request number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadRef(pub u64);

impl ThreadRef {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a comment published on a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentRef(pub u64);

impl CommentRef {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Open, command-owned data bag persisted with a record.
///
/// The store never interprets these keys. Commands validate them against
/// their own entry schema once the owning command is known.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryFields(Map<String, Value>);

impl EntryFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value, returning `None` when it is not an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::default()),
            _ => None,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Shallow key merge: new keys are added, existing keys overwritten and
    /// keys absent from `partial` are preserved.
    pub fn merge(&mut self, partial: EntryFields) {
        for (key, value) in partial.0 {
            self.0.insert(key, value);
        }
    }

    /// Returns a copy of `self` with `partial` merged on top.
    pub fn merged_with(&self, partial: &EntryFields) -> EntryFields {
        let mut merged = self.clone();
        merged.merge(partial.clone());
        merged
    }
}

impl From<Map<String, Value>> for EntryFields {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Persisted unit of state for one command evaluation tied to a thread.
///
/// `id`, `command_name`, `thread_ref` and `args` are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    pub id: String,
    pub command_name: String,
    pub thread_ref: ThreadRef,
    pub status: EntryStatus,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub fields: EntryFields,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackingRecord {
    /// Creates a record in the pending state at version 1.
    pub fn new(
        id: impl Into<String>,
        command_name: impl Into<String>,
        thread_ref: ThreadRef,
        args: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            command_name: command_name.into(),
            thread_ref,
            status: EntryStatus::Pending,
            args,
            fields: EntryFields::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_fields(mut self, fields: EntryFields) -> Self {
        self.fields = fields;
        self
    }

    /// Applies a partial update in place and bumps the version stamp.
    pub fn apply_update(&mut self, partial: EntryFields, status: Option<EntryStatus>) {
        self.fields.merge(partial);
        if let Some(status) = status {
            self.status = status;
        }
        self.version = self.version.saturating_add(1);
        self.updated_at = Utc::now();
    }
}

/// Per-thread bookkeeping row, created lazily on first access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadIndexEntry {
    pub thread_ref: ThreadRef,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub summary_comment_ref: Option<CommentRef>,
}

impl ThreadIndexEntry {
    pub fn new(thread_ref: ThreadRef) -> Self {
        Self {
            thread_ref,
            namespace: None,
            summary_comment_ref: None,
        }
    }
}
