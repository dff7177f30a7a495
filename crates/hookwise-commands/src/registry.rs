//! Name-keyed command catalog and preset binding.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hookwise_core::TrackingRecord;
use serde_json::Value;
use thiserror::Error;

use crate::arguments::CommandArgs;
use crate::command::{
    Command, CommandContext, CommandDefinition, CommandError, CommandOutput, CommandScope,
    CommentSection,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command '{0}' is already registered")]
    DuplicateName(String),
    #[error("cannot bind unknown base command '{0}'")]
    UnknownBase(String),
}

/// Metadata for a bound command. Schemas and scope fall back to the base.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingMeta {
    pub name: String,
    pub description: String,
    pub hidden: bool,
    pub scope: Option<CommandScope>,
    pub entry_schema: Option<Value>,
    pub arg_schema: Option<Value>,
}

impl BindingMeta {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// A command specialised by prepending fixed arguments to a base command.
pub struct BoundCommand {
    base: Arc<dyn Command>,
    preset_args: Vec<String>,
    meta: BindingMeta,
}

impl BoundCommand {
    pub fn base_name(&self) -> String {
        self.base.definition().name
    }

    pub fn preset_args(&self) -> &[String] {
        &self.preset_args
    }

    fn combined_args(&self, raw_args: Vec<String>) -> Vec<String> {
        let mut combined = self.preset_args.clone();
        combined.extend(raw_args);
        combined
    }
}

/// Derives a command that invokes `base` with `preset_args` ahead of any
/// caller-supplied arguments.
pub fn bind(base: Arc<dyn Command>, preset_args: Vec<String>, meta: BindingMeta) -> BoundCommand {
    BoundCommand {
        base,
        preset_args,
        meta,
    }
}

#[async_trait]
impl Command for BoundCommand {
    fn definition(&self) -> CommandDefinition {
        let base = self.base.definition();
        CommandDefinition {
            name: self.meta.name.clone(),
            description: self.meta.description.clone(),
            hidden: self.meta.hidden,
            scope: self.meta.scope.clone().unwrap_or(base.scope),
            entry_schema: self
                .meta
                .entry_schema
                .clone()
                .unwrap_or(base.entry_schema),
            arg_schema: self.meta.arg_schema.clone().or(base.arg_schema),
        }
    }

    async fn run(
        &self,
        context: CommandContext<'_>,
        args: CommandArgs,
    ) -> Result<CommandOutput, CommandError> {
        self.base.run(context, args).await
    }

    fn construct_comment(&self, record: &TrackingRecord, values: &Value) -> Vec<CommentSection> {
        self.base.construct_comment(record, values)
    }

    fn headline(&self, record: &TrackingRecord, values: &Value) -> Option<String> {
        self.base.headline(record, values)
    }

    /// Prepends the presets, then validates against this binding's
    /// argument schema, which replaces the base schema when overridden.
    fn prepare_args(&self, raw_args: Vec<String>) -> Result<CommandArgs, CommandError> {
        CommandArgs::prepare(&self.definition(), self.combined_args(raw_args))
    }
}

/// Catalog of commands keyed by globally unique name.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `command`; a duplicate name is a startup configuration error.
    pub fn register<C>(&mut self, command: C) -> Result<(), RegistryError>
    where
        C: Command + 'static,
    {
        self.register_arc(Arc::new(command))
    }

    pub fn register_arc(&mut self, command: Arc<dyn Command>) -> Result<(), RegistryError> {
        let name = command.definition().name;
        if self.commands.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        tracing::debug!(command = %name, "registered command");
        self.commands.insert(name, command);
        Ok(())
    }

    /// Binds presets onto the registered command `base_name` and registers
    /// the result under `meta.name`.
    pub fn register_bound(
        &mut self,
        base_name: &str,
        preset_args: Vec<String>,
        meta: BindingMeta,
    ) -> Result<(), RegistryError> {
        let base = self
            .lookup(base_name)
            .ok_or_else(|| RegistryError::UnknownBase(base_name.to_string()))?;
        self.register(bind(base, preset_args, meta))
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    /// Definitions of commands not marked hidden, sorted by name.
    pub fn visible(&self) -> Vec<CommandDefinition> {
        self.commands
            .values()
            .map(|command| command.definition())
            .filter(|definition| !definition.hidden)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}
