/*!
 * Bulwark - protective layer for calls to unreliable dependencies
 *
 * Wraps the primitives of `bulwark-core-resilience` with:
 * - TOML configuration with validation
 * - Structured logging to stdout or a JSON log file
 * - Process exit codes for partial and fatal failures
 * - Command-line demonstrations against a simulated flaky service
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod cli_style;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod simulate;

// Re-export commonly used types
pub use bulwark_core_resilience as resilience;
pub use commands::CallReport;
pub use config::{BulwarkConfig, LogLevel};
pub use error::{BulwarkError, Result};
pub use simulate::{FlakyService, ServiceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
