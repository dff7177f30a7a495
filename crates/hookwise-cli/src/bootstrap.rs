use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::CliLogFormat;

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// machine-readable.
pub(crate) fn init_tracing(format: CliLogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        CliLogFormat::Pretty => builder.compact().init(),
        CliLogFormat::Json => builder.json().init(),
    }
}
