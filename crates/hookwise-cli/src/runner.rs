use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use hookwise_commands::{builtin_registry, CommandDefinition, CommandRegistry};
use hookwise_comments::{GithubThreadApi, GithubThreadApiConfig, RepoRef};
use hookwise_core::{Credentials, ExecutionContext, ThreadRef};
use hookwise_matchers::{builtin_matchers, EventDelivery, MatchDisposition};
use hookwise_reconcile::{DispatchOutcome, ReconcileOutcome, Reconciler, ReconcilerBuilder};
use hookwise_store::SqliteStore;
use serde_json::{json, Value};

use crate::cli_args::{Cli, CliCommand};

const GITHUB_TOKEN_SECRET: &str = "github_token";

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let registry = builtin_registry().context("failed to build command registry")?;
    if !cli.command.needs_thread_api() {
        let include_hidden = matches!(cli.command, CliCommand::Commands { all: true });
        return print_json(&render_command_listing(&registry, include_hidden));
    }

    let (repo, token) = github_settings(&cli)?;
    let context = ExecutionContext::new(
        cli.environment.clone(),
        Credentials::new().with_secret(GITHUB_TOKEN_SECRET, token.clone()),
    );
    let reconciler = build_reconciler(&cli, registry, repo, token)?;

    match cli.command {
        CliCommand::Dispatch {
            event_file,
            delivery_id,
            declared_type,
        } => {
            let event = read_event(&event_file)?;
            let mut delivery = EventDelivery::new(
                delivery_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            );
            delivery.declared_type = declared_type;
            let outcome = reconciler
                .dispatch(&context, &event, &delivery)
                .await
                .with_context(|| format!("dispatch of delivery {} failed", delivery.delivery_id))?;
            print_json(&render_dispatch_outcome(&outcome))
        }
        CliCommand::Invoke {
            command,
            thread,
            args,
        } => {
            let outcome = reconciler
                .invoke_command(&context, &command, ThreadRef(thread), args)
                .await
                .with_context(|| format!("invocation of '{command}' on #{thread} failed"))?;
            print_json(&render_reconcile_outcome(&outcome))
        }
        CliCommand::Rerun { entry_id } => {
            let status = reconciler
                .lookup_and_re_evaluate(&context, &entry_id)
                .await
                .with_context(|| format!("re-evaluation of entry '{entry_id}' failed"))?;
            print_json(&json!({ "entryId": entry_id, "status": status }))
        }
        CliCommand::Commands { .. } => Ok(()),
    }
}

fn github_settings(cli: &Cli) -> Result<(RepoRef, String)> {
    let raw_repo = cli
        .github_repo
        .as_deref()
        .ok_or_else(|| anyhow!("--github-repo (or HOOKWISE_GITHUB_REPO) is required"))?;
    let repo = RepoRef::parse(raw_repo)?;
    let token = cli
        .github_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| anyhow!("--github-token (or GITHUB_TOKEN) is required"))?;
    Ok((repo, token.to_string()))
}

fn build_reconciler(
    cli: &Cli,
    registry: CommandRegistry,
    repo: RepoRef,
    token: String,
) -> Result<Reconciler> {
    let store = Arc::new(SqliteStore::new(&cli.state_db).with_context(|| {
        format!("failed to open state database {}", cli.state_db.display())
    })?);
    let thread_api = GithubThreadApi::new(GithubThreadApiConfig {
        api_base: cli.github_api_base.clone(),
        token,
        repo,
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })?;
    tracing::debug!(
        state_db = %cli.state_db.display(),
        repo = %thread_api.repo().as_slug(),
        "reconciler configured"
    );
    Ok(ReconcilerBuilder::new(store.clone(), store, Arc::new(thread_api))
        .registry(registry)
        .matchers(builtin_matchers())
        .build())
}

fn read_event(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read event file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("event file {} is not valid JSON", path.display()))
}

fn print_json(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render output")?
    );
    Ok(())
}

fn render_definition(definition: &CommandDefinition) -> Value {
    json!({
        "name": definition.name,
        "description": definition.description,
        "hidden": definition.hidden,
        "acceptsArguments": definition.arg_schema.is_some(),
    })
}

pub(crate) fn render_command_listing(registry: &CommandRegistry, include_hidden: bool) -> Value {
    let definitions = if include_hidden {
        registry
            .names()
            .iter()
            .filter_map(|name| registry.lookup(name))
            .map(|command| command.definition())
            .collect::<Vec<_>>()
    } else {
        registry.visible()
    };
    Value::Array(definitions.iter().map(render_definition).collect())
}

pub(crate) fn render_reconcile_outcome(outcome: &ReconcileOutcome) -> Value {
    json!({
        "entryId": outcome.entry_id,
        "status": outcome.status,
        "comment": outcome.comment.get(),
        "renderedComment": outcome.rendered_comment,
    })
}

pub(crate) fn render_dispatch_outcome(outcome: &DispatchOutcome) -> Value {
    let report = outcome.report();
    let attempts = report
        .attempts
        .iter()
        .map(|attempt| {
            let disposition = match &attempt.disposition {
                MatchDisposition::Matched => "matched",
                MatchDisposition::NotApplicable { .. } => "not_applicable",
                MatchDisposition::Failed { .. } => "failed",
                MatchDisposition::RejectedEnvelope { .. } => "rejected_envelope",
                MatchDisposition::UnknownEntry { .. } => "unknown_entry",
                MatchDisposition::PoisonedEntry { .. } => "poisoned_entry",
                MatchDisposition::Conflict { .. } => "conflict",
            };
            json!({ "matcher": attempt.matcher, "disposition": disposition })
        })
        .collect::<Vec<_>>();
    match outcome {
        DispatchOutcome::Unmatched(_) => json!({
            "deliveryId": report.delivery_id,
            "outcome": "unmatched",
            "attempts": attempts,
        }),
        DispatchOutcome::Reconciled { outcome, .. } => json!({
            "deliveryId": report.delivery_id,
            "outcome": "reconciled",
            "attempts": attempts,
            "result": render_reconcile_outcome(outcome),
        }),
    }
}
