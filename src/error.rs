/*!
 * Error types for Bulwark
 */

use bulwark_core_resilience::ConfigError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BulwarkError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum BulwarkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A protection setting failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Some protected calls did not succeed
    #[error("{failed} of {total} protected call(s) failed")]
    CallsFailed { failed: u64, total: u64 },
}

impl BulwarkError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BulwarkError::Config(_)
            | BulwarkError::InvalidConfig(_)
            | BulwarkError::Io(_)
            | BulwarkError::TomlParse(_)
            | BulwarkError::TomlSerialize(_) => EXIT_FATAL,
            BulwarkError::CallsFailed { .. } => EXIT_PARTIAL,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.exit_code() == EXIT_FATAL
    }
}
