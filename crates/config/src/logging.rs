//! Logging configuration for the stackinit agent
//!
//! Compact terminal output, plus an optional debug-level log file.

use crate::{Error, Result};
use std::path::Path;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are shown at the selected level
const TARGETS: &[&str] = &[
    "stackinit",
    "stackinit_engine",
    "stackinit_config",
    "stackinit_http",
];

/// Build the default filter directive for `level`
fn default_directive(level: &str) -> String {
    TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| Error::Configuration(format!("invalid log filter '{directive}': {e}")))
}

/// Initialize the logging system
///
/// `RUST_LOG` overrides the default filter. Verbose mode switches to `debug`
/// and adds timestamps; the log file always records at `debug`.
///
/// ```ignore
/// init(false, None)?;
/// init(true, Some(Path::new("/var/log/cfn-init.log")))?;
/// ```
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter(&default_directive(level))?,
    };

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_ansi(true);
    // Timestamps only in verbose mode
    let stdout_layer = if verbose {
        stdout_layer.with_filter(env_filter).boxed()
    } else {
        stdout_layer.without_time().with_filter(env_filter).boxed()
    };

    let file_layer = match log_file {
        Some(log_path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .map_err(|e| Error::FileWrite {
                    path: log_path.to_path_buf(),
                    source: e,
                })?;
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .pretty()
                    .with_filter(filter("debug")?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Configuration(format!("failed to initialize logging: {e}")))
}
