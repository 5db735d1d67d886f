//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a service
//! is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Service is unhealthy, requests fail immediately
//! - HalfOpen: A single trial call is testing whether the service has recovered
//!
//! Leaving Open is a gating decision taken when a call arrives: once
//! `reset_timeout` has passed since the breaker opened, exactly one caller is
//! let through as the trial. Its outcome closes the breaker or re-opens it with
//! a fresh timer. Every other caller is rejected while the trial is in flight.
//!
//! All state lives behind one mutex per breaker, and the lock is never held
//! while the protected operation runs.

use super::error::{ConfigError, ResilienceError};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    Open,
    /// A trial call is in flight
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::ZeroResetTimeout);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { opened_at: Instant },
    /// Trial in flight; `opened_at` is kept so an abandoned trial can
    /// fall back to Open without restarting the timer
    HalfOpen { opened_at: Instant },
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    phase: Phase,
    /// Consecutive failure count
    failure_count: u32,
    /// Bumped on every transition; outcomes from an older epoch are stale
    epoch: u64,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            phase: Phase::Closed,
            failure_count: 0,
            epoch: 0,
        }
    }

    fn transition(&mut self, phase: Phase) {
        self.phase = phase;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failure_count: u32,
    /// When the breaker last opened; `None` while closed
    pub opened_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Trial,
}

/// Admission ticket for one call. Dropping it without recording an outcome
/// (the caller was cancelled) records nothing, and a trial permit hands its
/// slot back so the next caller can become the trial.
pub(crate) struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    kind: PermitKind,
    epoch: u64,
    recorded: bool,
}

impl Permit<'_> {
    /// Await the protected future and feed its outcome back to the breaker
    pub(crate) async fn guard<Fut, T, E>(mut self, fut: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let result = fut.await;
        self.recorded = true;
        self.breaker.on_outcome(self.kind, self.epoch, result.is_ok());
        result.map_err(|source| ResilienceError::OperationFailed {
            attempts: 1,
            source,
        })
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.recorded && self.kind == PermitKind::Trial {
            self.breaker.abandon_trial(self.epoch);
        }
    }
}

/// Circuit breaker for protecting against cascading failures
///
/// # Example
/// ```no_run
/// use bulwark_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), ResilienceError<std::io::Error>> {
///     let breaker = CircuitBreaker::new(CircuitBreakerConfig {
///         failure_threshold: 2,
///         reset_timeout: Duration::from_secs(5),
///     })
///     .expect("valid config");
///
///     let result = breaker
///         .call(|| async { Ok::<_, std::io::Error>(42) })
///         .await?;
///
///     println!("Result: {}", result);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        })
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default() -> Self {
        Self {
            config: Arc::new(CircuitBreakerConfig::default()),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.stats().state
    }

    /// Get current failure count
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn stats(&self) -> CircuitStats {
        let state = self.lock();
        let (circuit_state, opened_at) = match state.phase {
            Phase::Closed => (CircuitState::Closed, None),
            Phase::Open { opened_at } => (CircuitState::Open, Some(opened_at)),
            Phase::HalfOpen { opened_at } => (CircuitState::HalfOpen, Some(opened_at)),
        };
        CircuitStats {
            state: circuit_state,
            failure_count: state.failure_count,
            opened_at,
        }
    }

    /// Time left before a trial call will be allowed, if the circuit is open
    pub fn remaining_open_time(&self) -> Option<Duration> {
        match self.lock().phase {
            Phase::Open { opened_at } => Some(
                self.config
                    .reset_timeout
                    .saturating_sub(Instant::now().saturating_duration_since(opened_at)),
            ),
            _ => None,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.lock();
        state.transition(Phase::Closed);
        state.failure_count = 0;
        info!("circuit breaker manually reset");
    }

    /// Force the circuit open, starting a fresh reset timeout
    pub fn trip(&self) {
        let mut state = self.lock();
        state.transition(Phase::Open {
            opened_at: Instant::now(),
        });
        state.failure_count = self.config.failure_threshold;
        warn!("circuit breaker manually opened");
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// The operation runs at most once. If the circuit is open the call fails
    /// with [`ResilienceError::CircuitOpen`] and `op` is never invoked; a
    /// failure of `op` itself is returned as `OperationFailed`.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.try_acquire() {
            Some(permit) => permit.guard(op()).await,
            None => Err(ResilienceError::CircuitOpen),
        }
    }

    /// Decide whether a call may proceed, claiming the trial slot if the
    /// reset timeout has elapsed
    pub(crate) fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.lock();

        let kind = match state.phase {
            Phase::Closed => PermitKind::Normal,
            Phase::Open { opened_at } => {
                if Instant::now().saturating_duration_since(opened_at) >= self.config.reset_timeout
                {
                    state.transition(Phase::HalfOpen { opened_at });
                    debug!("reset timeout elapsed, admitting trial call");
                    PermitKind::Trial
                } else {
                    debug!("timeout not elapsed yet, circuit breaker still open");
                    return None;
                }
            }
            Phase::HalfOpen { .. } => {
                debug!("trial call in flight, rejecting");
                return None;
            }
        };

        Some(Permit {
            breaker: self,
            kind,
            epoch: state.epoch,
            recorded: false,
        })
    }

    fn on_outcome(&self, kind: PermitKind, epoch: u64, success: bool) {
        let mut state = self.lock();
        if state.epoch != epoch {
            // The breaker moved on while this call was running
            return;
        }

        match (kind, success) {
            (PermitKind::Normal, true) => {
                state.failure_count = 0;
            }
            (PermitKind::Normal, false) => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    state.transition(Phase::Open {
                        opened_at: Instant::now(),
                    });
                    warn!(
                        failures = state.failure_count,
                        threshold = self.config.failure_threshold,
                        "failures threshold reached, circuit breaker opened"
                    );
                }
            }
            (PermitKind::Trial, true) => {
                state.transition(Phase::Closed);
                state.failure_count = 0;
                info!("trial call succeeded, circuit breaker closed");
            }
            (PermitKind::Trial, false) => {
                state.transition(Phase::Open {
                    opened_at: Instant::now(),
                });
                state.failure_count = self.config.failure_threshold;
                warn!("trial call failed, circuit breaker opened");
            }
        }
    }

    fn abandon_trial(&self, epoch: u64) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }
        if let Phase::HalfOpen { opened_at } = state.phase {
            state.transition(Phase::Open { opened_at });
            debug!("trial call abandoned, circuit breaker back to open");
        }
    }
}
