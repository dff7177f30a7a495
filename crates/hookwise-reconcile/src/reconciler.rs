use std::sync::Arc;

use hookwise_commands::{validate_entry_fields, CommandContext, CommandRegistry, Trigger};
use hookwise_comments::{render_comment, render_internal_error_comment, ThreadApi};
use hookwise_core::{CommentRef, EntryStatus, ExecutionContext, ThreadRef, TrackingRecord};
use hookwise_matchers::{builtin_matchers, EventDelivery, MatcherChain, MatcherChainReport};
use hookwise_store::{EntryStore, IssueIndex};
use serde_json::Value;
use tracing::Instrument;

use crate::error::ReconcileError;
use crate::publisher::SummaryCommentPublisher;

/// Result of one successful reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub entry_id: String,
    pub status: EntryStatus,
    pub comment: CommentRef,
    pub rendered_comment: String,
}

/// Result of dispatching one raw event.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// No matcher resolved the event to a stored record. Not an error.
    Unmatched(MatcherChainReport),
    Reconciled {
        report: MatcherChainReport,
        outcome: ReconcileOutcome,
    },
}

impl DispatchOutcome {
    pub fn report(&self) -> &MatcherChainReport {
        match self {
            Self::Unmatched(report) => report,
            Self::Reconciled { report, .. } => report,
        }
    }
}

pub struct ReconcilerBuilder {
    entries: Arc<dyn EntryStore>,
    threads: Arc<dyn IssueIndex>,
    thread_api: Arc<dyn ThreadApi>,
    registry: CommandRegistry,
    matchers: Option<MatcherChain>,
}

impl ReconcilerBuilder {
    pub fn new(
        entries: Arc<dyn EntryStore>,
        threads: Arc<dyn IssueIndex>,
        thread_api: Arc<dyn ThreadApi>,
    ) -> Self {
        Self {
            entries,
            threads,
            thread_api,
            registry: CommandRegistry::new(),
            matchers: None,
        }
    }

    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Overrides the built-in matcher chain.
    pub fn matchers(mut self, matchers: MatcherChain) -> Self {
        self.matchers = Some(matchers);
        self
    }

    pub fn build(self) -> Reconciler {
        Reconciler {
            publisher: SummaryCommentPublisher::new(self.threads.clone(), self.thread_api),
            entries: self.entries,
            threads: self.threads,
            registry: self.registry,
            matchers: self.matchers.unwrap_or_else(builtin_matchers),
        }
    }
}

pub struct Reconciler {
    entries: Arc<dyn EntryStore>,
    threads: Arc<dyn IssueIndex>,
    registry: CommandRegistry,
    matchers: MatcherChain,
    publisher: SummaryCommentPublisher,
}

impl Reconciler {
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn matchers(&self) -> &MatcherChain {
        &self.matchers
    }

    /// Runs the matcher chain and reconciles the record it resolves to.
    pub async fn dispatch(
        &self,
        context: &ExecutionContext,
        event: &Value,
        delivery: &EventDelivery,
    ) -> Result<DispatchOutcome, ReconcileError> {
        let report = self
            .matchers
            .run(context, event, delivery, self.entries.as_ref())
            .instrument(context.span("dispatch"))
            .await?;
        let Some(matched) = report.matched.clone() else {
            return Ok(DispatchOutcome::Unmatched(report));
        };
        let trigger = Trigger::new(matched.matcher, matched.trigger_fields);
        let outcome = self
            .re_evaluate_and_update(context, &matched.record, Some(&trigger))
            .await?;
        Ok(DispatchOutcome::Reconciled { report, outcome })
    }

    /// Creates a tracking record for a direct invocation and evaluates it.
    pub async fn invoke_command(
        &self,
        context: &ExecutionContext,
        command_name: &str,
        thread: ThreadRef,
        args: Vec<String>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let entry_id = uuid::Uuid::new_v4().to_string();
        let Some(command) = self.registry.lookup(command_name) else {
            tracing::warn!(command = command_name, thread = %thread, "unknown command invoked");
            return Err(ReconcileError::UnknownCommand {
                entry_id,
                command: command_name.to_string(),
            });
        };

        command
            .prepare_args(args.clone())
            .map_err(|error| ReconcileError::command_failed(command_name, error))?;

        let thread_entry = self.threads.ensure(thread).await?;
        if !command
            .definition()
            .scope
            .allows(thread_entry.namespace.as_deref())
        {
            return Err(ReconcileError::CommandNotAllowed {
                command: command_name.to_string(),
                thread,
            });
        }

        let record = TrackingRecord::new(entry_id, command_name, thread, args);
        self.entries.create(record.clone()).await?;
        tracing::info!(
            entry_id = %record.id,
            command = command_name,
            thread = %thread,
            "created tracking entry"
        );
        self.re_evaluate_and_update(context, &record, None).await
    }

    /// Administrative re-run keyed by tracking id.
    pub async fn lookup_and_re_evaluate(
        &self,
        context: &ExecutionContext,
        entry_id: &str,
    ) -> Result<EntryStatus, ReconcileError> {
        let record = self
            .entries
            .get(entry_id)
            .await
            .map_err(|error| ReconcileError::from_lookup(entry_id, error))?
            .ok_or_else(|| ReconcileError::NotFound(entry_id.to_string()))?;
        let outcome = self.re_evaluate_and_update(context, &record, None).await?;
        Ok(outcome.status)
    }

    /// Re-runs the record's command, persists the result and publishes the
    /// refreshed summary comment.
    ///
    /// Lookup and schema failures leave the stored record untouched. Any
    /// failure also attempts a best-effort internal-error comment.
    pub async fn re_evaluate_and_update(
        &self,
        context: &ExecutionContext,
        record: &TrackingRecord,
        trigger: Option<&Trigger>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let span = context.span("reconcile");
        async {
            tracing::info!(
                entry_id = %record.id,
                command = %record.command_name,
                status = %record.status,
                "reconciliation started"
            );
            match self.evaluate(context, record, trigger).await {
                Ok(outcome) => {
                    tracing::info!(
                        entry_id = %outcome.entry_id,
                        command = %record.command_name,
                        status = %outcome.status,
                        "reconciliation finished"
                    );
                    Ok(outcome)
                }
                Err(error) => {
                    if error.is_transient() {
                        tracing::warn!(
                            entry_id = %record.id,
                            command = %record.command_name,
                            error = %error,
                            "reconciliation failed"
                        );
                    } else {
                        tracing::error!(
                            entry_id = %record.id,
                            command = %record.command_name,
                            error = %error,
                            "reconciliation failed"
                        );
                    }
                    self.publish_internal_error(record, &error).await;
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn evaluate(
        &self,
        context: &ExecutionContext,
        record: &TrackingRecord,
        trigger: Option<&Trigger>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let command = self.registry.lookup(&record.command_name).ok_or_else(|| {
            ReconcileError::UnknownCommand {
                entry_id: record.id.clone(),
                command: record.command_name.clone(),
            }
        })?;
        let definition = command.definition();
        let validation_failed = |violation: String| ReconcileError::ValidationFailed {
            entry_id: record.id.clone(),
            command: Some(definition.name.clone()),
            reason: format!(
                "does not satisfy the '{}' entry schema: {violation}",
                definition.name
            ),
        };
        validate_entry_fields(&definition, &record.fields).map_err(validation_failed)?;

        let command_context = CommandContext {
            execution: context,
            record,
            trigger,
        };
        let output = command
            .main(command_context, record.args.clone())
            .await
            .map_err(|error| ReconcileError::command_failed(&definition.name, error))?;
        validate_entry_fields(&definition, &record.fields.merged_with(&output.entry))
            .map_err(validation_failed)?;

        let status = EntryStatus::from(output.status);
        let updated = self
            .entries
            .update(&record.id, output.entry, Some(status))
            .await?;
        if status == EntryStatus::Error {
            tracing::error!(
                entry_id = %updated.id,
                command = %updated.command_name,
                "command reported an internal error"
            );
        }

        let sections = command.construct_comment(&updated, &output.values);
        let headline = command.headline(&updated, &output.values);
        let rendered_comment = render_comment(&updated, headline.as_deref(), &sections);
        let comment = self
            .publisher
            .publish_or_update(updated.thread_ref, &rendered_comment)
            .await?;
        Ok(ReconcileOutcome {
            entry_id: updated.id,
            status,
            comment,
            rendered_comment,
        })
    }

    async fn publish_internal_error(&self, record: &TrackingRecord, error: &ReconcileError) {
        let body = render_internal_error_comment(record, &error.to_string());
        if let Err(publish_error) = self
            .publisher
            .publish_or_update(record.thread_ref, &body)
            .await
        {
            tracing::warn!(
                entry_id = %record.id,
                error = %publish_error,
                "failed to publish internal error comment"
            );
        }
    }
}
