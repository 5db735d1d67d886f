//! Error types for resilience primitives
//!
//! Two families live here:
//! - [`ResilienceError`]: the outcome of a protected call, generic over the
//!   error type of the underlying operation.
//! - [`ConfigError`]: rejected configuration, raised when a component is built.

use thiserror::Error;

/// Failure surfaced to the caller of a protected operation.
///
/// `RateLimited` and `CircuitOpen` mean the operation was never invoked and the
/// caller should back off. `OperationFailed` means the dependency was attempted
/// and failed, carrying the last error observed.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// Admission rejected before reaching the breaker
    #[error("rate limit exceeded for '{key}': {rule}")]
    RateLimited { key: String, rule: String },

    /// Breaker is open and the reset timeout has not elapsed
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The operation was invoked and failed on its final attempt
    #[error("operation failed after {attempts} attempt(s): {source}")]
    OperationFailed {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E> {
    /// True when the call was turned away without touching the dependency
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ResilienceError::RateLimited { .. } | ResilienceError::CircuitOpen
        )
    }

    /// True when the dependency itself was attempted and failed
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, ResilienceError::OperationFailed { .. })
    }

    /// True when more than one attempt was made before giving up
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, ResilienceError::OperationFailed { attempts, .. } if *attempts > 1)
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ResilienceError::RateLimited { .. })
    }

    /// Number of attempts that reached the operation
    pub fn attempts(&self) -> u32 {
        match self {
            ResilienceError::OperationFailed { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Borrow the underlying operation error, if any
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ResilienceError::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Take the underlying operation error, if any
    pub fn into_source(self) -> Option<E> {
        match self {
            ResilienceError::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Short label used in logs and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            ResilienceError::RateLimited { .. } => "rate_limited",
            ResilienceError::CircuitOpen => "circuit_open",
            ResilienceError::OperationFailed { attempts, .. } if *attempts > 1 => {
                "retries_exhausted"
            }
            ResilienceError::OperationFailed { .. } => "operation_failed",
        }
    }
}

/// Invalid configuration for one of the resilience components
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failure_threshold must be greater than zero")]
    ZeroFailureThreshold,

    #[error("reset_timeout must be greater than zero")]
    ZeroResetTimeout,

    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("rate limit quota must be greater than zero")]
    ZeroQuota,

    #[error("rate limit window must be greater than zero")]
    ZeroWindow,

    #[error("backoff multiplier must be at least 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("invalid rate limit rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("unknown rate limit strategy '{0}'")]
    UnknownStrategy(String),
}
