//! Shared helper functions used across CLI subcommands.

use std::path::PathBuf;

use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so stdout stays free for the stdio transport and for
/// reports.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Report the outcome of loading `.env`; a missing file is silent.
pub fn log_dotenv(result: &Result<PathBuf, dotenvy::Error>) {
    match result {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to load .env"),
    }
}
