use async_trait::async_trait;
use hookwise_core::{EntryFields, TrackingRecord};
use serde_json::{json, Value};

use crate::arguments::CommandArgs;
use crate::command::{
    Command, CommandContext, CommandDefinition, CommandError, CommandOutput, CommentSection,
};

pub const PING_COMMAND_NAME: &str = "ping";

/// Echoes its arguments back into the thread. Useful for checking wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingCommand;

#[async_trait]
impl Command for PingCommand {
    fn definition(&self) -> CommandDefinition {
        let mut definition =
            CommandDefinition::new(PING_COMMAND_NAME, "Reply with pong and echo the arguments");
        definition.entry_schema = json!({
            "type": "object",
            "properties": { "echo": { "type": "string" } }
        });
        definition
    }

    async fn run(
        &self,
        context: CommandContext<'_>,
        args: CommandArgs,
    ) -> Result<CommandOutput, CommandError> {
        let echo = args.raw.join(" ");
        tracing::debug!(
            entry_id = %context.record.id,
            env = %context.execution.environment,
            "ping"
        );
        Ok(
            CommandOutput::success(EntryFields::new().with("echo", echo))
                .with_values(json!({ "reply": "pong" })),
        )
    }

    fn construct_comment(&self, record: &TrackingRecord, values: &Value) -> Vec<CommentSection> {
        let reply = values
            .get("reply")
            .and_then(Value::as_str)
            .unwrap_or("pong");
        let mut sections = vec![CommentSection::body(format!("**{reply}**"))];
        if let Some(echo) = record
            .fields
            .get("echo")
            .and_then(Value::as_str)
            .filter(|echo| !echo.is_empty())
        {
            sections.push(CommentSection::new("Echo", format!("`{echo}`")));
        }
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::PingCommand;
    use crate::command::{Command, CommandContext, CommandStatus};
    use hookwise_core::{Credentials, ExecutionContext, ThreadRef, TrackingRecord};
    use serde_json::json;

    #[tokio::test]
    async fn functional_ping_echoes_arguments_and_replies_pong() {
        let execution = ExecutionContext::new("test", Credentials::new());
        let record = TrackingRecord::new("p-1", "ping", ThreadRef(3), Vec::new());
        let output = PingCommand
            .main(
                CommandContext {
                    execution: &execution,
                    record: &record,
                    trigger: None,
                },
                vec!["hello".into(), "there".into()],
            )
            .await
            .expect("ping");

        assert_eq!(output.status, CommandStatus::Success);
        assert_eq!(output.entry.get("echo"), Some(&json!("hello there")));
        assert_eq!(output.values, json!({ "reply": "pong" }));
    }

    #[test]
    fn unit_ping_comment_includes_echo_only_when_present() {
        let mut record = TrackingRecord::new("p-1", "ping", ThreadRef(3), Vec::new());
        let sections = PingCommand.construct_comment(&record, &json!({ "reply": "pong" }));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].body, "**pong**");

        record.fields.insert("echo", json!("hi"));
        let sections = PingCommand.construct_comment(&record, &json!({}));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].heading.as_deref(), Some("Echo"));
    }
}
