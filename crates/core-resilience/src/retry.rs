//! Retry controller with pluggable delay policies
//!
//! [`RetryPolicy`] drives up to `max_attempts` invocations of an operation,
//! sleeping between failed attempts according to a [`DelayPolicy`]. The first
//! success short-circuits; if every attempt fails the last error is returned
//! inside a [`RetryError`]. No delay follows the final attempt.
//!
//! The controller holds no shared state: every `execute` call keeps its own
//! attempt counter on the stack, so one policy can be shared freely.

use super::error::{ConfigError, ResilienceError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Delay applied after a failed attempt, as a function of the attempt index
#[derive(Clone, Default)]
pub enum DelayPolicy {
    /// Retry immediately
    #[default]
    None,
    /// Same delay after every failed attempt
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
    /// Caller-supplied function of the 1-based attempt index
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl DelayPolicy {
    /// Exponential backoff, validating that the delay never shrinks
    pub fn exponential(
        initial: Duration,
        multiplier: f64,
        max: Duration,
    ) -> Result<Self, ConfigError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(multiplier));
        }
        Ok(DelayPolicy::Exponential {
            initial,
            multiplier,
            max,
        })
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        DelayPolicy::Custom(Arc::new(f))
    }

    /// Delay to wait after attempt number `attempt` (1-based) has failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            DelayPolicy::None => Duration::ZERO,
            DelayPolicy::Fixed(delay) => *delay,
            DelayPolicy::Exponential {
                initial,
                multiplier,
                max,
            } => {
                if initial.is_zero() {
                    return Duration::ZERO;
                }
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = initial.as_secs_f64() * multiplier.powi(exponent);
                if secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::try_from_secs_f64(secs).unwrap_or(*max)
                }
            }
            DelayPolicy::Custom(f) => f(attempt),
        }
    }
}

impl fmt::Debug for DelayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayPolicy::None => write!(f, "None"),
            DelayPolicy::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            DelayPolicy::Exponential {
                initial,
                multiplier,
                max,
            } => f
                .debug_struct("Exponential")
                .field("initial", initial)
                .field("multiplier", multiplier)
                .field("max", max)
                .finish(),
            DelayPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// All attempts failed, or a failure was classified as not worth retrying
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {source}")]
pub struct RetryError<E> {
    /// Attempts actually made
    pub attempts: u32,
    /// Error from the last attempt
    #[source]
    pub source: E,
}

impl<E> From<RetryError<E>> for ResilienceError<E> {
    fn from(err: RetryError<E>) -> Self {
        ResilienceError::OperationFailed {
            attempts: err.attempts,
            source: err.source,
        }
    }
}

/// Bounded retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: DelayPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: DelayPolicy::Fixed(Duration::from_secs(1)),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call, so it must be at least 1
    pub fn new(max_attempts: u32, delay: DelayPolicy) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Result<Self, ConfigError> {
        Self::new(max_attempts, DelayPolicy::Fixed(delay))
    }

    /// A single attempt, never retried
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: DelayPolicy::None,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_policy(&self) -> &DelayPolicy {
        &self.delay
    }

    /// Run `op` until it succeeds or the attempt budget is spent
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_if(op, |_| true).await
    }

    /// Like [`execute`](Self::execute), but stops at the first failure for
    /// which `should_retry` returns `false`.
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        mut op: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if attempt >= self.max_attempts || !should_retry(&error) {
                debug!(
                    attempt,
                    max_attempts = self.max_attempts,
                    error = %error,
                    "giving up"
                );
                return Err(RetryError {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.delay.delay_for(attempt);
            debug!(
                attempt,
                max_attempts = self.max_attempts,
                error = %error,
                ?delay,
                "attempt failed, retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
