//! JSON-schema checks for command entries and arguments.

use hookwise_core::EntryFields;
use jsonschema::validator_for;
use serde_json::Value;

use crate::command::{CommandDefinition, CommandError};

/// Returns the first violation of `schema` by `instance`, if any.
pub(crate) fn first_schema_violation(
    command: &str,
    schema: &Value,
    instance: &Value,
) -> Result<Option<String>, CommandError> {
    let validator = validator_for(schema).map_err(|error| CommandError::InvalidSchema {
        command: command.to_string(),
        message: error.to_string(),
    })?;
    let mut errors = validator.iter_errors(instance);
    Ok(errors.next().map(|first| first.to_string()))
}

/// Strict command-level check of a record's fields against the owning
/// command's entry schema.
///
/// Returns the violation message when the fields do not conform.
pub fn validate_entry_fields(
    definition: &CommandDefinition,
    fields: &EntryFields,
) -> Result<(), String> {
    match first_schema_violation(&definition.name, &definition.entry_schema, &fields.to_value()) {
        Ok(None) => Ok(()),
        Ok(Some(message)) => Err(message),
        Err(error) => Err(error.to_string()),
    }
}
