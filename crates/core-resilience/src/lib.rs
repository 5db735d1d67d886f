//! Bulwark Core Resilience: Pure-logic protection for calls to unreliable dependencies
//!
//! # Overview
//!
//! This crate provides three building blocks and one composition of them:
//!
//! - **Rate Limiter**: Per-key admission control over one or more `(quota, window)` rules
//! - **Retry Policy**: Bounded re-invocation with fixed, exponential or custom delays
//! - **Circuit Breaker**: Fails fast once a dependency has failed repeatedly, then
//!   lets a single trial call probe for recovery
//! - **Resilience Gate**: Rate limiter → retry → circuit breaker → operation
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - What the protected operation does (network call, database query, ...)
//! - Configuration files, logging sinks or process-wide singletons
//! - State shared across processes; everything is in memory and starts empty
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ invoke(key, op)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Rate Limiter                      │  ← Reject over-quota callers
//! │  (Fixed or sliding window, per key)     │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Policy                      │  ← Recover transient faults
//! │  (1..N attempts, delay between them)    │
//! └─────────────┬───────────────────────────┘
//!               │ each attempt
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Tracks failures, opens on threshold)  │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         External Service
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use bulwark_core_resilience::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gate = ResilienceGate::new(GateConfig {
//!     breaker: CircuitBreakerConfig {
//!         failure_threshold: 2,
//!         reset_timeout: Duration::from_secs(5),
//!     },
//!     retry: RetryPolicy::fixed(3, Duration::from_secs(1))?,
//!     rate_limits: vec!["10 per hour".parse()?],
//!     ..Default::default()
//! })?;
//!
//! let answer = gate
//!     .invoke("127.0.0.1", || async { Ok::<_, std::io::Error>(42) })
//!     .await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod gate;
pub mod rate_limiter;
pub mod retry;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats};
pub use error::{ConfigError, ResilienceError};
pub use gate::{GateConfig, ResilienceGate, GLOBAL_KEY};
pub use rate_limiter::{Admission, RateLimitRule, RateLimitStrategy, RateLimiter};
pub use retry::{DelayPolicy, RetryError, RetryPolicy};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use bulwark_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::error::{ConfigError, ResilienceError};
    pub use super::gate::{GateConfig, ResilienceGate};
    pub use super::rate_limiter::{RateLimitRule, RateLimitStrategy, RateLimiter};
    pub use super::retry::{DelayPolicy, RetryPolicy};
}
