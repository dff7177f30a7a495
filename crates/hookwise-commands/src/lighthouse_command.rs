//! Performance audit gate.
//!
//! The first run records the audited URL and threshold. A later event from
//! the audit pipeline carries the score, and the re-evaluation compares it
//! against the threshold.

use async_trait::async_trait;
use hookwise_core::{EntryFields, TrackingRecord};
use serde_json::{json, Value};

use crate::arguments::CommandArgs;
use crate::command::{
    Command, CommandContext, CommandDefinition, CommandError, CommandOutput, CommentSection,
};

pub const LIGHTHOUSE_COMMAND_NAME: &str = "lighthouse";
pub const DEFAULT_MIN_SCORE: u64 = 90;

const FAILED_BUILD_STATUSES: &[&str] = &["FAILED", "FAULT", "TIMED_OUT", "STOPPED"];

#[derive(Debug, Clone, Copy, Default)]
pub struct LighthouseCommand;

impl LighthouseCommand {
    fn entry_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "minLength": 1 },
                "minScore": { "type": "integer", "minimum": 0, "maximum": 100 },
                "score": { "type": "integer", "minimum": 0, "maximum": 100 },
                "buildStatus": { "type": "string" }
            }
        })
    }

    fn arg_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "_": {
                    "type": "array",
                    "minItems": 1,
                    "items": { "type": "string", "minLength": 1 }
                },
                "min-score": { "type": "integer", "minimum": 0, "maximum": 100 }
            },
            "required": ["_"]
        })
    }
}

/// Reads a score as an integer percentage. Fractions in `[0, 1]` are scaled.
fn parse_score(value: &Value) -> Result<u64, String> {
    let score = match value {
        Value::Number(number) => {
            if let Some(integer) = number.as_u64() {
                integer
            } else if let Some(fraction) = number.as_f64().filter(|f| (0.0..=1.0).contains(f)) {
                (fraction * 100.0).round() as u64
            } else {
                return Err(format!("score {number} is not a percentage"));
            }
        }
        Value::String(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("score '{raw}' is not an integer"))?,
        other => return Err(format!("score has unsupported type: {other}")),
    };
    if score > 100 {
        return Err(format!("score {score} exceeds 100"));
    }
    Ok(score)
}

#[async_trait]
impl Command for LighthouseCommand {
    fn definition(&self) -> CommandDefinition {
        let mut definition = CommandDefinition::new(
            LIGHTHOUSE_COMMAND_NAME,
            "Gate on the performance score of an audited URL",
        );
        definition.entry_schema = Self::entry_schema();
        definition.arg_schema = Some(Self::arg_schema());
        definition
    }

    async fn run(
        &self,
        context: CommandContext<'_>,
        args: CommandArgs,
    ) -> Result<CommandOutput, CommandError> {
        let url = args.positional(0).ok_or_else(|| CommandError::InvalidArguments {
            command: LIGHTHOUSE_COMMAND_NAME.to_string(),
            message: "missing URL".to_string(),
        })?;
        let min_score = args.flag_u64("min-score").unwrap_or(DEFAULT_MIN_SCORE);
        let mut entry = EntryFields::new()
            .with("url", url)
            .with("minScore", min_score);

        let trigger_fields = context.trigger.map(|trigger| &trigger.fields);
        let raw_score = trigger_fields
            .and_then(|fields| fields.get("score"))
            .or_else(|| context.record.fields.get("score"));
        let build_status = trigger_fields
            .and_then(|fields| fields.get("buildStatus"))
            .and_then(Value::as_str);
        if let Some(build_status) = build_status {
            entry.insert("buildStatus", build_status);
        }

        let Some(raw_score) = raw_score else {
            if let Some(build_status) =
                build_status.filter(|status| FAILED_BUILD_STATUSES.contains(status))
            {
                return Ok(CommandOutput::error(entry).with_values(json!({
                    "detail": format!("audit build ended with {build_status} before reporting a score")
                })));
            }
            return Ok(CommandOutput::success(entry).with_values(json!({ "awaiting": true })));
        };

        let score = parse_score(raw_score)
            .map_err(|message| CommandError::execution(LIGHTHOUSE_COMMAND_NAME, message))?;
        entry.insert("score", score);
        let values = json!({ "passed": score >= min_score });
        if score >= min_score {
            Ok(CommandOutput::success(entry).with_values(values))
        } else {
            Ok(CommandOutput::failure(entry).with_values(values))
        }
    }

    fn headline(&self, record: &TrackingRecord, values: &Value) -> Option<String> {
        let awaiting = values.get("awaiting").and_then(Value::as_bool) == Some(true);
        (awaiting && record.fields.get("score").is_none()).then(|| "awaiting score".to_string())
    }

    fn construct_comment(&self, record: &TrackingRecord, values: &Value) -> Vec<CommentSection> {
        let url = record
            .fields
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("(unknown URL)");
        let min_score = record
            .fields
            .get("minScore")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MIN_SCORE);
        let mut sections = vec![CommentSection::new(
            "Lighthouse audit",
            format!("Target: {url}\nRequired score: {min_score}"),
        )];

        match record.fields.get("score").and_then(Value::as_u64) {
            Some(score) => {
                let verdict = if score >= min_score { "passes" } else { "is below" };
                sections.push(CommentSection::body(format!(
                    "Score **{score}** {verdict} the threshold."
                )));
            }
            None => {
                let detail = values
                    .get("detail")
                    .and_then(Value::as_str)
                    .unwrap_or("Waiting for the audit to report a score.");
                sections.push(CommentSection::body(detail));
            }
        }
        sections
    }
}
