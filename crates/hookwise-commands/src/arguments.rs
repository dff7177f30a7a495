//! Argument parsing and schema binding for command invocations.

use serde_json::{Map, Number, Value};

use crate::command::{CommandDefinition, CommandError};
use crate::schema::first_schema_violation;

/// Key under which positional arguments are collected.
pub const POSITIONAL_KEY: &str = "_";

/// Arguments handed to [`crate::Command::run`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandArgs {
    /// The raw argument vector, presets first for bound commands.
    pub raw: Vec<String>,
    /// Parsed object; present only when the command declares an argument schema.
    pub parsed: Option<Value>,
}

impl CommandArgs {
    pub fn raw(raw: Vec<String>) -> Self {
        Self { raw, parsed: None }
    }

    /// Parses `raw` and validates it when `definition` declares an argument schema.
    pub fn prepare(definition: &CommandDefinition, raw: Vec<String>) -> Result<Self, CommandError> {
        let Some(schema) = definition.arg_schema.as_ref() else {
            return Ok(Self::raw(raw));
        };
        let parsed = parse_flag_arguments(&raw);
        if let Some(message) = first_schema_violation(&definition.name, schema, &parsed)? {
            return Err(CommandError::InvalidArguments {
                command: definition.name.clone(),
                message,
            });
        }
        Ok(Self {
            raw,
            parsed: Some(parsed),
        })
    }

    pub fn flag(&self, key: &str) -> Option<&Value> {
        self.parsed.as_ref().and_then(|parsed| parsed.get(key))
    }

    pub fn flag_str(&self, key: &str) -> Option<&str> {
        self.flag(key).and_then(Value::as_str)
    }

    pub fn flag_u64(&self, key: &str) -> Option<u64> {
        self.flag(key).and_then(Value::as_u64)
    }

    /// Positional argument at `index`, from the parsed object when present.
    pub fn positional(&self, index: usize) -> Option<&str> {
        match &self.parsed {
            Some(parsed) => parsed
                .get(POSITIONAL_KEY)
                .and_then(Value::as_array)
                .and_then(|items| items.get(index))
                .and_then(Value::as_str),
            None => self.raw.get(index).map(String::as_str),
        }
    }
}

/// Parses `--key value`, `--key=value` and bare `--flag` tokens into an object.
///
/// Flag values that look like booleans or numbers are coerced. Positionals,
/// including everything after a `--` terminator, are kept as strings under
/// [`POSITIONAL_KEY`]. A repeated flag keeps its last value.
pub fn parse_flag_arguments(raw: &[String]) -> Value {
    let mut object = Map::new();
    let mut positionals = Vec::new();
    let mut tokens = raw.iter().peekable();
    let mut only_positionals = false;

    while let Some(token) = tokens.next() {
        if only_positionals {
            positionals.push(Value::String(token.clone()));
            continue;
        }
        if token == "--" {
            only_positionals = true;
            continue;
        }
        let Some(flag) = token.strip_prefix("--").filter(|flag| !flag.is_empty()) else {
            positionals.push(Value::String(token.clone()));
            continue;
        };

        if let Some((key, value)) = flag.split_once('=') {
            object.insert(key.to_string(), coerce_flag_value(value));
            continue;
        }

        let takes_value = tokens
            .peek()
            .map(|next| !next.starts_with("--"))
            .unwrap_or(false);
        let value = if takes_value {
            tokens
                .next()
                .map(|next| coerce_flag_value(next))
                .unwrap_or(Value::Bool(true))
        } else {
            Value::Bool(true)
        };
        object.insert(flag.to_string(), value);
    }

    object.insert(POSITIONAL_KEY.to_string(), Value::Array(positionals));
    Value::Object(object)
}

fn coerce_flag_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return Value::Number(integer.into());
    }
    if let Some(number) = raw
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .and_then(Number::from_f64)
    {
        return Value::Number(number);
    }
    Value::String(raw.to_string())
}
