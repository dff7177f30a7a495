use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_thread_number(value: &str) -> Result<u64, String> {
    parse_positive_u64(value.trim().trim_start_matches('#'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "hookwise",
    about = "Reconcile bot command status comments against infrastructure events",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "HOOKWISE_STATE_DB",
        default_value = ".hookwise/state.sqlite",
        help = "SQLite database holding tracking entries and the thread index."
    )]
    pub state_db: PathBuf,

    #[arg(
        long,
        env = "HOOKWISE_ENVIRONMENT",
        default_value = "production",
        help = "Environment name attached to every log span."
    )]
    pub environment: String,

    #[arg(
        long,
        env = "HOOKWISE_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub API base URL."
    )]
    pub github_api_base: String,

    #[arg(
        long,
        env = "HOOKWISE_GITHUB_REPO",
        help = "Repository whose issues and pull requests receive status comments (owner/repo)."
    )]
    pub github_repo: Option<String>,

    #[arg(
        long,
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "Token used to publish status comments."
    )]
    pub github_token: Option<String>,

    #[arg(
        long,
        env = "HOOKWISE_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Timeout for one GitHub API request in milliseconds."
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long,
        env = "HOOKWISE_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for a retryable GitHub API request."
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long,
        env = "HOOKWISE_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for exponential GitHub API retry backoff."
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long,
        env = "HOOKWISE_LOG_FORMAT",
        value_enum,
        default_value_t = CliLogFormat::Pretty,
        help = "Log output format written to stderr."
    )]
    pub log_format: CliLogFormat,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the matcher chain over one raw event and reconcile the matched entry.
    Dispatch {
        #[arg(long, help = "Path to the raw JSON event payload.")]
        event_file: PathBuf,
        #[arg(long, help = "Transport delivery id; generated when omitted.")]
        delivery_id: Option<String>,
        #[arg(long, help = "Event type declared by the transport.")]
        declared_type: Option<String>,
    },
    /// Invoke a command on a thread and publish its status comment.
    Invoke {
        command: String,
        #[arg(long, value_parser = parse_thread_number)]
        thread: u64,
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Re-evaluate a stored tracking entry by id.
    Rerun { entry_id: String },
    /// List registered commands.
    Commands {
        #[arg(long, help = "Include hidden preset commands.")]
        all: bool,
    },
}

impl CliCommand {
    pub fn needs_thread_api(&self) -> bool {
        !matches!(self, Self::Commands { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, CliCommand, CliLogFormat};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn unit_defaults_apply_without_flags() {
        let cli = Cli::try_parse_from(["hookwise", "commands"]).expect("parse");
        assert_eq!(cli.state_db, PathBuf::from(".hookwise/state.sqlite"));
        assert_eq!(cli.github_api_base, "https://api.github.com");
        assert_eq!(cli.retry_max_attempts, 4);
        assert_eq!(cli.log_format, CliLogFormat::Pretty);
        assert!(!cli.command.needs_thread_api());
    }

    #[test]
    fn functional_invoke_collects_trailing_arguments() {
        let cli = Cli::try_parse_from([
            "hookwise",
            "--github-repo",
            "acme/site",
            "invoke",
            "lighthouse",
            "--thread",
            "#42",
            "--",
            "https://example.com",
            "--min-score",
            "95",
        ])
        .expect("parse");
        let CliCommand::Invoke {
            command,
            thread,
            args,
        } = cli.command
        else {
            panic!("expected invoke");
        };
        assert_eq!(command, "lighthouse");
        assert_eq!(thread, 42);
        assert_eq!(args, vec!["https://example.com", "--min-score", "95"]);
    }

    #[test]
    fn regression_zero_retry_attempts_are_rejected() {
        let error = Cli::try_parse_from(["hookwise", "--retry-max-attempts", "0", "commands"])
            .expect_err("zero attempts");
        assert!(error.to_string().contains("greater than 0"));
    }
}
