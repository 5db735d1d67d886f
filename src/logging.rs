/*!
 * Diagnostic logging for the CLI and the protection library
 *
 * Two targets are filtered: `bulwark` (demo runners, config) and
 * `bulwark_core_resilience` (admission, breaker transitions, retry attempts).
 * `RUST_LOG` replaces the configured directive entirely.
 */

use std::fs::OpenOptions;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::BulwarkConfig;
use crate::error::{BulwarkError, Result};

/// Level the subscriber will run at; `verbose` wins over `log_level`
pub fn effective_level(config: &BulwarkConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Same level for both crates, nothing from dependencies
pub fn default_directive(level: Level) -> String {
    format!("bulwark={level},bulwark_core_resilience={level}")
}

pub fn log_filter(config: &BulwarkConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(effective_level(config))))
        .map_err(|e| BulwarkError::Config(format!("Invalid log filter: {}", e)))
}

/// Install the global subscriber: compact lines on stdout, or JSON appended
/// to `log_file` when one is configured
pub fn init_logging(config: &BulwarkConfig) -> Result<()> {
    let filter = log_filter(config)?;

    match config.log_file {
        Some(ref path) => init_json_file(path, filter),
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).compact())
                .init();
            Ok(())
        }
    }
}

/// One event per line with its fields (key, attempt, kind, ...) at the top
/// level; the file is appended to so successive runs can be compared
fn init_json_file(path: &Path, filter: EnvFilter) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            BulwarkError::Config(format!("Cannot open log file {}: {}", path.display(), e))
        })?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(file)
                .with_target(true)
                .with_ansi(false),
        )
        .init();

    Ok(())
}
