//! Logging configuration for the hookflow CLI
//!
//! Terminal output plus optional file logging using tracing.

use crate::Result;
use hookflow_core::Error;
use std::path::Path;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are shown by default
const LOG_TARGETS: [&str; 4] = [
    "hookflow",
    "hookflow_engine",
    "hookflow_config",
    "hookflow_core",
];

fn default_filter(level: &str) -> Result<EnvFilter> {
    let directives = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::try_new(directives).map_err(|e| Error::Config(format!("Invalid log filter: {e}")))
}

/// Initialize the logging system
///
/// # Arguments
/// * `verbose` - Enable debug level logging
/// * `log_file` - Optional path to write logs to a file
///
/// `RUST_LOG` overrides the default filter.
///
/// # Examples
/// ```ignore
/// init(false, None)?;
/// init(true, Some(Path::new("hookflow.log")))?;
/// ```
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(level)?,
    };

    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_ansi(true);

    // No timestamps in normal mode
    let terminal_layer = if verbose {
        terminal_layer.with_filter(env_filter).boxed()
    } else {
        terminal_layer.without_time().with_filter(env_filter).boxed()
    };

    let file_layer = match log_file {
        Some(log_path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?;

            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .pretty()
                    .with_filter(default_filter("debug")?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_default_filter_covers_all_targets() {
        let filter = default_filter("debug").unwrap();
        let rendered = filter.to_string();
        for target in LOG_TARGETS {
            assert!(rendered.contains(target), "missing {target} in {rendered}");
        }
    }
}
