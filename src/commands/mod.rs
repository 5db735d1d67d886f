/*!
 * Demonstration commands
 *
 * Each command drives a [`FlakyService`](crate::simulate::FlakyService)
 * through one protection layer (or the whole gate), optionally echoing one
 * line per call, and returns a [`CallReport`].
 */

pub mod breaker;
pub mod gate;
pub mod retry;
pub mod throttle;

use bulwark_core_resilience::ResilienceError;

use crate::error::{BulwarkError, Result};

/// Outcome counts for a batch of protected calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallReport {
    pub total: u64,
    pub succeeded: u64,
    /// The operation ran and its error was returned
    pub failed: u64,
    pub circuit_open: u64,
    pub rate_limited: u64,
}

impl CallReport {
    pub fn record<T, E>(&mut self, result: &std::result::Result<T, ResilienceError<E>>) {
        self.total += 1;
        match result {
            Ok(_) => self.succeeded += 1,
            Err(ResilienceError::OperationFailed { .. }) => self.failed += 1,
            Err(ResilienceError::CircuitOpen) => self.circuit_open += 1,
            Err(ResilienceError::RateLimited { .. }) => self.rate_limited += 1,
        }
    }

    pub fn rejected(&self) -> u64 {
        self.circuit_open + self.rate_limited
    }

    /// Rows for [`stats_table`](crate::cli_style::stats_table)
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Calls", self.total.to_string()),
            ("Succeeded", self.succeeded.to_string()),
            ("Failed", self.failed.to_string()),
            ("Circuit open", self.circuit_open.to_string()),
            ("Rate limited", self.rate_limited.to_string()),
        ]
    }

    /// Rejections are the protection working as intended; only operation
    /// failures make the run a partial failure.
    pub fn check(self) -> Result<Self> {
        if self.failed > 0 {
            return Err(BulwarkError::CallsFailed {
                failed: self.failed,
                total: self.total,
            });
        }
        Ok(self)
    }
}

/// Wall-clock timestamp for demo output lines
pub(crate) fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
