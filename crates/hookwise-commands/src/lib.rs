//! Command protocol, registry and built-in commands for hookwise.
//!
//! A command declares its entry and argument schemas, computes a status plus
//! a partial entry from an execution context, and renders comment sections.
//! The registry is built once at startup and keyed by globally unique names;
//! bound commands specialise an existing command with preset arguments.

pub mod arguments;
pub mod builtin;
pub mod command;
pub mod lighthouse_command;
pub mod ping_command;
pub mod registry;
pub mod schema;

pub use arguments::{parse_flag_arguments, CommandArgs};
pub use builtin::builtin_registry;
pub use command::{
    Command, CommandContext, CommandDefinition, CommandError, CommandOutput, CommandScope,
    CommandStatus, CommentSection, Trigger,
};
pub use registry::{bind, BindingMeta, BoundCommand, CommandRegistry, RegistryError};
pub use schema::validate_entry_fields;
