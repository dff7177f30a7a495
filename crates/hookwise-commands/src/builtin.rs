use crate::lighthouse_command::{LighthouseCommand, LIGHTHOUSE_COMMAND_NAME};
use crate::ping_command::PingCommand;
use crate::registry::{BindingMeta, CommandRegistry, RegistryError};

pub const LIGHTHOUSE_STRICT_COMMAND_NAME: &str = "lighthouse-strict";

/// Builds the registry of commands shipped with hookwise.
pub fn builtin_registry() -> Result<CommandRegistry, RegistryError> {
    let mut registry = CommandRegistry::new();
    registry.register(PingCommand)?;
    registry.register(LighthouseCommand)?;
    registry.register_bound(
        LIGHTHOUSE_COMMAND_NAME,
        vec!["--min-score".to_string(), "95".to_string()],
        BindingMeta::new(
            LIGHTHOUSE_STRICT_COMMAND_NAME,
            "Lighthouse gate with a score threshold of 95",
        )
        .hidden(),
    )?;
    Ok(registry)
}
