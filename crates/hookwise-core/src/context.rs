//! Explicit per-invocation context threaded through matchers and commands.

use std::collections::BTreeMap;
use std::fmt;

use tracing::Span;

/// Opaque credential bundle supplied by the caller's secret provider.
///
/// `Debug` never prints secret values.
#[derive(Clone, Default)]
pub struct Credentials {
    secrets: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    pub fn secret(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("names", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Minimal context shared by every stage of event handling.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub environment: String,
    pub credentials: Credentials,
}

impl ExecutionContext {
    pub fn new(environment: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            environment: environment.into(),
            credentials,
        }
    }

    /// Creates a span tagging log output with the operation and environment.
    #[must_use]
    pub fn span(&self, operation: &'static str) -> Span {
        tracing::info_span!("hookwise", op = operation, env = %self.environment)
    }
}
