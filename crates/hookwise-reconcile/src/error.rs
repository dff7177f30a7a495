use hookwise_commands::CommandError;
use hookwise_comments::ThreadApiError;
use hookwise_core::ThreadRef;
use hookwise_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("tracking entry '{0}' not found")]
    NotFound(String),
    #[error("entry '{entry_id}' references unknown command '{command}'")]
    UnknownCommand { entry_id: String, command: String },
    /// Stored or merged fields are unusable; `command` is `None` when the
    /// record could not be decoded at all.
    #[error("entry '{entry_id}' {reason}")]
    ValidationFailed {
        entry_id: String,
        command: Option<String>,
        reason: String,
    },
    #[error("storage unavailable: {message}")]
    StorageUnavailable { message: String },
    #[error("storage failure: {0}")]
    Storage(StoreError),
    #[error("invalid arguments for '{command}': {message}")]
    InvalidArguments { command: String, message: String },
    #[error("command '{command}' failed: {message}")]
    CommandExecution { command: String, message: String },
    #[error("command '{command}' is not allowed on thread {thread}")]
    CommandNotAllowed { command: String, thread: ThreadRef },
    #[error("thread api failure: {message}")]
    ThreadApi { message: String },
}

impl ReconcileError {
    /// Returns true when the caller may retry the whole invocation later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    /// Maps a failed record read, reporting undecodable rows as poisoned.
    pub(crate) fn from_lookup(entry_id: &str, error: StoreError) -> Self {
        if error.is_corrupt() {
            return Self::ValidationFailed {
                entry_id: entry_id.to_string(),
                command: None,
                reason: format!("cannot be decoded from storage: {error}"),
            };
        }
        error.into()
    }

    pub(crate) fn command_failed(command: &str, error: CommandError) -> Self {
        match error {
            CommandError::InvalidArguments { command, message } => {
                Self::InvalidArguments { command, message }
            }
            error => Self::CommandExecution {
                command: command.to_string(),
                message: error.to_string(),
            },
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(id),
            error if error.is_transient() => Self::StorageUnavailable {
                message: error.to_string(),
            },
            error => Self::Storage(error),
        }
    }
}

impl From<ThreadApiError> for ReconcileError {
    fn from(error: ThreadApiError) -> Self {
        Self::ThreadApi {
            message: error.to_string(),
        }
    }
}
