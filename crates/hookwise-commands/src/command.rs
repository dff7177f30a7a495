use async_trait::async_trait;
use hookwise_core::{EntryFields, EntryStatus, ExecutionContext, TrackingRecord};
use serde_json::{json, Value};
use thiserror::Error;

use crate::arguments::CommandArgs;

/// Errors raised while preparing or running a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("invalid arguments for '{command}': {message}")]
    InvalidArguments { command: String, message: String },
    #[error("invalid JSON schema for '{command}': {message}")]
    InvalidSchema { command: String, message: String },
    #[error("command '{command}' failed: {message}")]
    Execution { command: String, message: String },
}

impl CommandError {
    pub fn execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Thread contexts a command may be invoked from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommandScope {
    #[default]
    Any,
    /// Only threads whose index row carries this namespace tag.
    Namespace(String),
}

impl CommandScope {
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Namespace(required) => namespace == Some(required.as_str()),
        }
    }
}

/// Static description of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    /// Excluded from listings; has no effect on dispatch.
    pub hidden: bool,
    pub scope: CommandScope,
    /// JSON schema for the persisted fields this command owns.
    pub entry_schema: Value,
    /// JSON schema for parsed arguments. `None` passes raw positional
    /// arguments through untouched.
    pub arg_schema: Option<Value>,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            hidden: false,
            scope: CommandScope::Any,
            entry_schema: json!({ "type": "object" }),
            arg_schema: None,
        }
    }
}

/// Outcome of one command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// A well-formed negative result; still renders a comment.
    Failure,
    /// An internal fault reported by the command itself.
    Error,
}

impl From<CommandStatus> for EntryStatus {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => EntryStatus::Success,
            CommandStatus::Failure => EntryStatus::Failure,
            CommandStatus::Error => EntryStatus::Error,
        }
    }
}

/// Result of [`Command::main`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    /// Fields merged into the persisted record.
    pub entry: EntryFields,
    /// Render-only data, never persisted.
    pub values: Value,
}

impl CommandOutput {
    pub fn new(status: CommandStatus, entry: EntryFields) -> Self {
        Self {
            status,
            entry,
            values: Value::Object(Default::default()),
        }
    }

    pub fn success(entry: EntryFields) -> Self {
        Self::new(CommandStatus::Success, entry)
    }

    pub fn failure(entry: EntryFields) -> Self {
        Self::new(CommandStatus::Failure, entry)
    }

    pub fn error(entry: EntryFields) -> Self {
        Self::new(CommandStatus::Error, entry)
    }

    pub fn with_values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }
}

/// Data carried by the event that woke a re-evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trigger {
    pub matcher: String,
    pub fields: EntryFields,
}

impl Trigger {
    pub fn new(matcher: impl Into<String>, fields: EntryFields) -> Self {
        Self {
            matcher: matcher.into(),
            fields,
        }
    }
}

/// Borrowed view handed to a command for one execution.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub execution: &'a ExecutionContext,
    /// The record being evaluated; freshly created and pending on first run.
    pub record: &'a TrackingRecord,
    pub trigger: Option<&'a Trigger>,
}

/// One renderable block of a status comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSection {
    pub heading: Option<String>,
    pub body: String,
}

impl CommentSection {
    pub fn new(heading: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            heading: Some(heading.into()),
            body: body.into(),
        }
    }

    pub fn body(body: impl Into<String>) -> Self {
        Self {
            heading: None,
            body: body.into(),
        }
    }
}

/// Execution contract every registered command implements.
///
/// Re-running `main` for an existing record must not repeat external side
/// effects beyond recomputing status.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use hookwise_commands::{
///     Command, CommandArgs, CommandContext, CommandDefinition, CommandError, CommandOutput,
///     CommentSection,
/// };
/// use hookwise_core::{EntryFields, TrackingRecord};
/// use serde_json::Value;
///
/// struct Noop;
///
/// #[async_trait]
/// impl Command for Noop {
///     fn definition(&self) -> CommandDefinition {
///         CommandDefinition::new("noop", "Does nothing")
///     }
///
///     async fn run(
///         &self,
///         _context: CommandContext<'_>,
///         _args: CommandArgs,
///     ) -> Result<CommandOutput, CommandError> {
///         Ok(CommandOutput::success(EntryFields::new()))
///     }
///
///     fn construct_comment(&self, _record: &TrackingRecord, _values: &Value) -> Vec<CommentSection> {
///         vec![CommentSection::body("nothing to report")]
///     }
/// }
///
/// assert_eq!(Noop.definition().name, "noop");
/// ```
#[async_trait]
pub trait Command: Send + Sync {
    fn definition(&self) -> CommandDefinition;

    /// Executes with arguments already parsed against the argument schema.
    async fn run(
        &self,
        context: CommandContext<'_>,
        args: CommandArgs,
    ) -> Result<CommandOutput, CommandError>;

    /// Pure rendering of the record and render-only values.
    fn construct_comment(&self, record: &TrackingRecord, values: &Value) -> Vec<CommentSection>;

    /// Replaces the status word in the comment header, e.g. while a result
    /// is still outstanding.
    fn headline(&self, _record: &TrackingRecord, _values: &Value) -> Option<String> {
        None
    }

    /// Parses raw arguments and checks them against the argument schema.
    fn prepare_args(&self, raw_args: Vec<String>) -> Result<CommandArgs, CommandError> {
        CommandArgs::prepare(&self.definition(), raw_args)
    }

    /// Validates raw arguments and runs the command.
    async fn main(
        &self,
        context: CommandContext<'_>,
        raw_args: Vec<String>,
    ) -> Result<CommandOutput, CommandError> {
        let args = self.prepare_args(raw_args)?;
        self.run(context, args).await
    }
}
