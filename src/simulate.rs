/*!
 * Simulated unreliable dependency used by the CLI demonstrations
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by [`FlakyService`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} call #{request}: temporary {service} error")]
pub struct ServiceError {
    pub service: String,
    pub request: u64,
}

/// A dependency that fails each call with a fixed probability
#[derive(Debug)]
pub struct FlakyService {
    name: String,
    failure_rate: f64,
    latency: Duration,
    rng: Mutex<StdRng>,
    calls: AtomicU64,
    failures: AtomicU64,
}

impl FlakyService {
    /// `failure_rate` is clamped to `0.0..=1.0`
    pub fn new(name: impl Into<String>, failure_rate: f64) -> Self {
        Self::with_rng(name, failure_rate, StdRng::from_os_rng())
    }

    /// Reproducible outcome sequence
    pub fn seeded(name: impl Into<String>, failure_rate: f64, seed: u64) -> Self {
        Self::with_rng(name, failure_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(name: impl Into<String>, failure_rate: f64, rng: StdRng) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        Self {
            name: name.into(),
            failure_rate,
            latency: Duration::ZERO,
            rng: Mutex::new(rng),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Simulated time spent inside each call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Times the dependency was actually reached
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn call(&self, request: u64) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let fails = {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            rng.random_bool(self.failure_rate)
        };

        if fails {
            self.failures.fetch_add(1, Ordering::Relaxed);
            Err(ServiceError {
                service: self.name.clone(),
                request,
            })
        } else {
            Ok(format!("Connected to {}", self.name))
        }
    }
}
