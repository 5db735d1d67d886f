//! Resilience Gate: rate limiting, circuit breaking and retries in one call
//!
//! ```text
//! caller ──► RateLimiter.check(key) ──► RetryPolicy ──► CircuitBreaker ──► operation
//!              │ rejected                 │  ▲              │ open
//!              ▼                          │  └── attempt ◄──┘
//!         RateLimited                     ▼
//!                               terminal Result
//! ```
//!
//! Rate limiting runs first so an over-quota caller never feeds the breaker's
//! failure statistics. Every retry attempt goes back through the breaker, so
//! retries stop hitting a dependency the moment it is known to be down.
//! By default a `CircuitOpen` rejection ends the retry loop immediately. If an
//! earlier attempt already reached the operation, the caller gets that
//! attempt's `OperationFailed` rather than the rejection.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::error::{ConfigError, ResilienceError};
use super::rate_limiter::{Admission, RateLimitRule, RateLimitStrategy, RateLimiter};
use super::retry::RetryPolicy;
use std::fmt;
use std::future::Future;
use tracing::{debug, warn};

/// Key used by [`ResilienceGate::invoke_global`]
pub const GLOBAL_KEY: &str = "global";

/// Everything needed to build a [`ResilienceGate`]
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    /// Every rule must admit a call; empty means no rate limiting
    pub rate_limits: Vec<RateLimitRule>,
    pub strategy: RateLimitStrategy,
    /// Keep retrying when the breaker rejects an attempt (default: fail fast)
    pub retry_on_open: bool,
}

/// Protective layer around calls to one unreliable dependency.
///
/// Build one per dependency at startup and share it; clones share the
/// breaker and limiter state.
#[derive(Debug, Clone)]
pub struct ResilienceGate {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    retry_on_open: bool,
}

impl ResilienceGate {
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            limiter: RateLimiter::new(config.rate_limits, config.strategy),
            breaker: CircuitBreaker::new(config.breaker)?,
            retry: config.retry,
            retry_on_open: config.retry_on_open,
        })
    }

    /// Assemble a gate from existing components, e.g. a limiter shared
    /// between several dependencies
    pub fn from_parts(limiter: RateLimiter, breaker: CircuitBreaker, retry: RetryPolicy) -> Self {
        Self {
            limiter,
            breaker,
            retry,
            retry_on_open: false,
        }
    }

    pub fn with_retry_on_open(mut self, retry_on_open: bool) -> Self {
        self.retry_on_open = retry_on_open;
        self
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn retries_on_open(&self) -> bool {
        self.retry_on_open
    }

    /// Run `op` for the rate-limit subject `key` through all three layers.
    ///
    /// `op` is called once per attempt that the breaker admits and never
    /// otherwise. Rejected attempts still use up the retry budget but are not
    /// counted in [`ResilienceError::attempts`].
    pub async fn invoke<F, Fut, T, E>(&self, key: &str, mut op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if let Admission::Rejected { rule } = self.limiter.check(key) {
            warn!(key, rule = %rule, "too many requests");
            return Err(ResilienceError::RateLimited {
                key: key.to_string(),
                rule: rule.to_string(),
            });
        }

        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;
        let mut invoked = 0;
        let mut last_failure: Option<E> = None;

        loop {
            attempt += 1;

            let rejected = match self.breaker.try_acquire() {
                Some(permit) => {
                    invoked += 1;
                    match permit.guard(op()).await {
                        Ok(value) => {
                            if attempt > 1 {
                                debug!(key, attempt, "gate call succeeded after retry");
                            }
                            return Ok(value);
                        }
                        Err(err) => {
                            last_failure = err.into_source();
                            false
                        }
                    }
                }
                None => true,
            };

            if attempt >= max_attempts || (rejected && !self.retry_on_open) {
                // A rejection never hides a failure the dependency already returned
                let err = match last_failure {
                    Some(source) => ResilienceError::OperationFailed {
                        attempts: invoked,
                        source,
                    },
                    None => ResilienceError::CircuitOpen,
                };
                debug!(key, attempt, attempts = invoked, kind = err.kind(), "gate call failed");
                return Err(err);
            }

            let delay = self.retry.delay_policy().delay_for(attempt);
            match last_failure {
                Some(ref error) if !rejected => debug!(
                    key,
                    attempt,
                    max_attempts,
                    error = %error,
                    ?delay,
                    "attempt failed, retrying"
                ),
                _ => debug!(key, attempt, max_attempts, ?delay, "breaker open, retrying"),
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// [`invoke`](Self::invoke) with a single process-wide rate-limit key
    pub async fn invoke_global<F, Fut, T, E>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.invoke(GLOBAL_KEY, op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::retry::DelayPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn gate(threshold: u32, max_attempts: u32) -> ResilienceGate {
        ResilienceGate::new(GateConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(5),
            },
            retry: RetryPolicy::fixed(max_attempts, Duration::from_millis(100)).unwrap(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_breaker_config_rejected() {
        let config = GateConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            ResilienceGate::new(config),
            Err(ConfigError::ZeroFailureThreshold)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_never_touches_breaker() {
        let gate = ResilienceGate::new(GateConfig {
            rate_limits: vec![RateLimitRule::per_minute(1).unwrap()],
            breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
            retry: RetryPolicy::no_retry(),
            ..Default::default()
        })
        .unwrap();
        let calls = AtomicU32::new(0);

        gate.invoke("k", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(()) }
        })
        .await
        .unwrap();

        let err = gate
            .invoke("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("down".to_string()) }
            })
            .await
            .unwrap_err();

        assert!(err.is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.circuit_breaker().failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_recover_transient_failure() {
        let gate = gate(5, 3);
        let calls = AtomicU32::new(0);

        let result = gate
            .invoke_global(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        Err("temporary database error".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        // Success reset the consecutive failure count
        assert_eq!(gate.circuit_breaker().failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_attempts() {
        let gate = gate(10, 3);

        let err = gate
            .invoke_global(|| async { Err::<(), _>("connection refused".to_string()) })
            .await
            .unwrap_err();

        assert!(err.is_retries_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.operation_error().unwrap(), "connection refused");
        assert_eq!(gate.circuit_breaker().failure_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_trip_stops_retries_and_keeps_last_error() {
        let gate = gate(2, 5);
        let calls = AtomicU32::new(0);

        let err = gate
            .invoke_global(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(format!("db down #{}", n)) }
            })
            .await
            .unwrap_err();

        // Third attempt was rejected by the now-open breaker; the caller
        // still sees the failure from the second one.
        assert!(err.is_retries_exhausted());
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.operation_error().unwrap(), "db down #2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.circuit_breaker().state(), CircuitState::Open);

        // The next call never reaches the dependency
        let err = gate
            .invoke_global(|| async { Ok::<_, String>(()) })
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(err.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_open_exhausted_reports_failure() {
        let gate = gate(1, 3).with_retry_on_open(true);
        assert!(gate.retries_on_open());
        let calls = AtomicU32::new(0);

        // t=0 fails and opens for 5s; attempts at t=0.1 and t=0.2 are rejected
        let err = gate
            .invoke_global(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("down".to_string()) }
            })
            .await
            .unwrap_err();

        assert!(err.is_operation_failure());
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.operation_error().unwrap(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_open_waits_for_trial() {
        let gate = ResilienceGate::new(GateConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(2),
            },
            retry: RetryPolicy::new(4, DelayPolicy::Fixed(Duration::from_secs(1))).unwrap(),
            retry_on_open: true,
            ..Default::default()
        })
        .unwrap();
        let calls = AtomicU32::new(0);

        // t=0 fail (opens), t=1 rejected, t=2 trial succeeds
        let result = gate
            .invoke_global(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        Err("down".to_string())
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.circuit_breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_rejects_before_retrying() {
        let gate = gate(1, 3);
        gate.circuit_breaker().trip();
        let calls = AtomicU32::new(0);

        let err = gate
            .invoke("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(()) }
            })
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(err.attempts(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
