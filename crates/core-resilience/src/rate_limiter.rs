//! Rate limiting for admission control
//!
//! A [`RateLimiter`] holds one or more [`RateLimitRule`]s (e.g. "100 per day"
//! *and* "10 per hour") and tracks admissions per caller key. A call is
//! admitted only when every rule admits it; the check runs over all rules
//! first and the increments are committed together under one lock, so a
//! rejection never consumes quota from any rule.
//!
//! Two strategies are supported:
//! - **Fixed window**: a counter per rule that resets once `window` has
//!   elapsed since the window started.
//! - **Sliding window**: a log of admission instants per rule; entries older
//!   than `window` are pruned before each check.
//!
//! # Example
//!
//! ```
//! use bulwark_core_resilience::rate_limiter::{RateLimitRule, RateLimitStrategy, RateLimiter};
//!
//! let rules = vec![
//!     "100 per day".parse::<RateLimitRule>().unwrap(),
//!     "10 per hour".parse::<RateLimitRule>().unwrap(),
//! ];
//! let limiter = RateLimiter::new(rules, RateLimitStrategy::FixedWindow);
//!
//! assert!(limiter.admit("127.0.0.1"));
//! assert_eq!(limiter.remaining("127.0.0.1"), Some(9));
//! ```

use super::error::{ConfigError, ResilienceError};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const SECOND: u64 = 1;
const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// A single `(quota, window)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    quota: u32,
    window: Duration,
}

impl RateLimitRule {
    /// Create a rule admitting at most `quota` calls per `window`.
    ///
    /// A zero quota or a zero window would never admit anything and is
    /// rejected here rather than treated as "no limit".
    pub fn new(quota: u32, window: Duration) -> Result<Self, ConfigError> {
        if quota == 0 {
            return Err(ConfigError::ZeroQuota);
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self { quota, window })
    }

    pub fn per_second(quota: u32) -> Result<Self, ConfigError> {
        Self::new(quota, Duration::from_secs(SECOND))
    }

    pub fn per_minute(quota: u32) -> Result<Self, ConfigError> {
        Self::new(quota, Duration::from_secs(MINUTE))
    }

    pub fn per_hour(quota: u32) -> Result<Self, ConfigError> {
        Self::new(quota, Duration::from_secs(HOUR))
    }

    pub fn per_day(quota: u32) -> Result<Self, ConfigError> {
        Self::new(quota, Duration::from_secs(DAY))
    }

    /// Maximum admissions per window
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Length of the window
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl fmt::Display for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.window.subsec_nanos() != 0 {
            return write!(
                f,
                "{} per {} millisecond",
                self.quota,
                self.window.as_millis()
            );
        }

        let secs = self.window.as_secs();
        let (count, unit) = [(DAY, "day"), (HOUR, "hour"), (MINUTE, "minute")]
            .into_iter()
            .find(|(size, _)| secs % size == 0)
            .map(|(size, unit)| (secs / size, unit))
            .unwrap_or((secs, "second"));

        write!(f, "{} per {} {}", self.quota, count, unit)
    }
}

impl FromStr for RateLimitRule {
    type Err = ConfigError;

    /// Parse `"10 per hour"`, `"2/minute"` or `"5 per 30 seconds"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            rule: s.to_string(),
            reason: reason.to_string(),
        };

        let lowered = s.trim().to_ascii_lowercase();
        let (quota, period) = lowered
            .split_once('/')
            .or_else(|| lowered.split_once(" per "))
            .ok_or_else(|| invalid("expected '<quota> per <unit>' or '<quota>/<unit>'"))?;

        let quota: u32 = quota
            .trim()
            .parse()
            .map_err(|_| invalid("quota is not a number"))?;

        let tokens: Vec<&str> = period.split_whitespace().collect();
        let (multiplier, unit) = match tokens.as_slice() {
            [unit] => (1, *unit),
            [count, unit] => (
                count
                    .parse::<u64>()
                    .map_err(|_| invalid("window count is not a number"))?,
                *unit,
            ),
            _ => return Err(invalid("expected a single time unit")),
        };

        let unit_secs = match unit {
            "ms" | "millisecond" | "milliseconds" => {
                return Self::new(quota, Duration::from_millis(multiplier));
            }
            "s" | "sec" | "second" | "seconds" => SECOND,
            "m" | "min" | "minute" | "minutes" => MINUTE,
            "h" | "hour" | "hours" => HOUR,
            "d" | "day" | "days" => DAY,
            _ => return Err(invalid("unknown time unit")),
        };
        let window = multiplier
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| invalid("window is too large"))?;

        Self::new(quota, window)
    }
}

/// Window accounting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitStrategy {
    /// Counter that resets at window boundaries
    #[default]
    FixedWindow,
    /// Rolling log of admission instants
    SlidingWindow,
}

impl FromStr for RateLimitStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed-window" | "fixed_window" | "fixed" => Ok(Self::FixedWindow),
            "sliding-window" | "sliding_window" | "sliding" | "moving-window" => {
                Ok(Self::SlidingWindow)
            }
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for RateLimitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitStrategy::FixedWindow => write!(f, "fixed-window"),
            RateLimitStrategy::SlidingWindow => write!(f, "sliding-window"),
        }
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Rejected by the first rule whose quota was exhausted
    Rejected { rule: RateLimitRule },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Per-rule accounting for one key
#[derive(Debug)]
enum WindowState {
    Fixed { count: u32, window_start: Instant },
    Sliding { admissions: VecDeque<Instant> },
}

/// True once `window` has fully elapsed since `start`. Time moving backwards
/// counts as "not elapsed" so a skewed clock cannot reopen a spent window.
fn window_elapsed(now: Instant, start: Instant, window: Duration) -> bool {
    now.checked_duration_since(start)
        .is_some_and(|elapsed| elapsed >= window)
}

impl WindowState {
    fn new(strategy: RateLimitStrategy, now: Instant) -> Self {
        match strategy {
            RateLimitStrategy::FixedWindow => WindowState::Fixed {
                count: 0,
                window_start: now,
            },
            RateLimitStrategy::SlidingWindow => WindowState::Sliding {
                admissions: VecDeque::new(),
            },
        }
    }

    /// Admissions currently counted against `rule`; read-only apart from
    /// pruning expired sliding entries, which never changes the outcome.
    fn used(&mut self, rule: &RateLimitRule, now: Instant) -> u32 {
        match self {
            WindowState::Fixed {
                count,
                window_start,
            } => {
                if window_elapsed(now, *window_start, rule.window) {
                    0
                } else {
                    *count
                }
            }
            WindowState::Sliding { admissions } => {
                while admissions
                    .front()
                    .is_some_and(|first| window_elapsed(now, *first, rule.window))
                {
                    admissions.pop_front();
                }
                admissions.len() as u32
            }
        }
    }

    fn commit(&mut self, rule: &RateLimitRule, now: Instant) {
        match self {
            WindowState::Fixed {
                count,
                window_start,
            } => {
                if window_elapsed(now, *window_start, rule.window) {
                    *window_start = now;
                    *count = 0;
                }
                *count += 1;
            }
            WindowState::Sliding { admissions } => admissions.push_back(now),
        }
    }
}

/// Multi-rule, per-key rate limiter.
///
/// Cloning is cheap and clones share state, so one limiter can be built at
/// startup and handed to every caller.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    rules: Arc<[RateLimitRule]>,
    strategy: RateLimitStrategy,
    windows: Arc<Mutex<HashMap<String, Vec<WindowState>>>>,
}

impl RateLimiter {
    /// Create a limiter enforcing every rule in `rules`.
    ///
    /// An empty rule list admits everything.
    pub fn new(rules: Vec<RateLimitRule>, strategy: RateLimitStrategy) -> Self {
        Self {
            rules: rules.into(),
            strategy,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Convenience constructor for a single fixed-window rule
    pub fn single(quota: u32, window: Duration) -> Result<Self, ConfigError> {
        Ok(Self::new(
            vec![RateLimitRule::new(quota, window)?],
            RateLimitStrategy::FixedWindow,
        ))
    }

    /// A limiter with no rules
    pub fn unlimited() -> Self {
        Self::new(Vec::new(), RateLimitStrategy::FixedWindow)
    }

    pub fn rules(&self) -> &[RateLimitRule] {
        &self.rules
    }

    pub fn strategy(&self) -> RateLimitStrategy {
        self.strategy
    }

    /// Admit and record a call for `key`, returning `false` when any rule
    /// is already exhausted in its current window.
    pub fn admit(&self, key: &str) -> bool {
        self.check(key).is_admitted()
    }

    /// Like [`admit`](Self::admit), but reports which rule rejected the call
    pub fn check(&self, key: &str) -> Admission {
        if self.rules.is_empty() {
            return Admission::Admitted;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let states = windows.entry(key.to_string()).or_insert_with(|| {
            self.rules
                .iter()
                .map(|_| WindowState::new(self.strategy, now))
                .collect()
        });

        for (rule, state) in self.rules.iter().zip(states.iter_mut()) {
            if state.used(rule, now) >= rule.quota {
                debug!(key, rule = %rule, "rate limit rejected admission");
                return Admission::Rejected { rule: *rule };
            }
        }

        for (rule, state) in self.rules.iter().zip(states.iter_mut()) {
            state.commit(rule, now);
        }

        debug!(key, "rate limit admitted call");
        Admission::Admitted
    }

    /// Smallest remaining quota across all rules for `key`, without
    /// recording anything. `None` when the limiter has no rules.
    pub fn remaining(&self, key: &str) -> Option<u32> {
        let min_quota = self.rules.iter().map(|rule| rule.quota).min()?;

        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(states) = windows.get_mut(key) else {
            return Some(min_quota);
        };

        self.rules
            .iter()
            .zip(states.iter_mut())
            .map(|(rule, state)| rule.quota.saturating_sub(state.used(rule, now)))
            .min()
    }

    /// Forget all recorded admissions for `key`
    pub fn reset(&self, key: &str) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.remove(key);
    }

    /// Keys that currently have window state
    pub fn tracked_keys(&self) -> Vec<String> {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.keys().cloned().collect()
    }

    /// Run `op` if `key` is admitted, otherwise fail fast with `RateLimited`
    pub async fn try_execute<F, Fut, T, E>(&self, key: &str, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        match self.check(key) {
            Admission::Admitted => op().await.map_err(|source| ResilienceError::OperationFailed {
                attempts: 1,
                source,
            }),
            Admission::Rejected { rule } => Err(ResilienceError::RateLimited {
                key: key.to_string(),
                rule: rule.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_validation() {
        assert_eq!(
            RateLimitRule::new(0, Duration::from_secs(1)),
            Err(ConfigError::ZeroQuota)
        );
        assert_eq!(
            RateLimitRule::new(5, Duration::ZERO),
            Err(ConfigError::ZeroWindow)
        );
        assert!(RateLimitRule::per_minute(2).is_ok());
    }

    #[test]
    fn test_rule_parsing() {
        let rule: RateLimitRule = "100 per day".parse().unwrap();
        assert_eq!(rule.quota(), 100);
        assert_eq!(rule.window(), Duration::from_secs(DAY));

        let rule: RateLimitRule = "2/minute".parse().unwrap();
        assert_eq!(rule.quota(), 2);
        assert_eq!(rule.window(), Duration::from_secs(MINUTE));

        let rule: RateLimitRule = "5 per 30 seconds".parse().unwrap();
        assert_eq!(rule.window(), Duration::from_secs(30));

        let rule: RateLimitRule = "10 Per Hour".parse().unwrap();
        assert_eq!(rule.window(), Duration::from_secs(HOUR));
    }

    #[test]
    fn test_rule_parsing_errors() {
        assert!(matches!(
            "ten per hour".parse::<RateLimitRule>(),
            Err(ConfigError::InvalidRule { .. })
        ));
        assert!(matches!(
            "10 per fortnight".parse::<RateLimitRule>(),
            Err(ConfigError::InvalidRule { .. })
        ));
        assert!(matches!(
            "10 hourly".parse::<RateLimitRule>(),
            Err(ConfigError::InvalidRule { .. })
        ));
        assert_eq!(
            "0 per minute".parse::<RateLimitRule>(),
            Err(ConfigError::ZeroQuota)
        );
    }

    #[test]
    fn test_rule_parsing_rejects_oversized_window() {
        match "5 per 300000000000000000 days".parse::<RateLimitRule>() {
            Err(ConfigError::InvalidRule { reason, .. }) => {
                assert_eq!(reason, "window is too large")
            }
            other => panic!("Expected InvalidRule, got {:?}", other),
        }
        assert!("5 per 300000000000000000 ms".parse::<RateLimitRule>().is_ok());
    }

    #[test]
    fn test_rule_display() {
        assert_eq!(RateLimitRule::per_hour(10).unwrap().to_string(), "10 per 1 hour");
        assert_eq!(RateLimitRule::per_minute(2).unwrap().to_string(), "2 per 1 minute");
        assert_eq!(
            RateLimitRule::new(5, Duration::from_secs(30)).unwrap().to_string(),
            "5 per 30 second"
        );
        assert_eq!(
            RateLimitRule::new(3, Duration::from_millis(250)).unwrap().to_string(),
            "3 per 250 millisecond"
        );
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "fixed-window".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::FixedWindow
        );
        assert_eq!(
            "moving-window".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::SlidingWindow
        );
        assert!("leaky".parse::<RateLimitStrategy>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_quota_and_reset() {
        let limiter = RateLimiter::single(3, Duration::from_secs(10)).unwrap();

        for _ in 0..3 {
            assert!(limiter.admit("client"));
        }
        assert!(!limiter.admit("client"));
        assert_eq!(limiter.remaining("client"), Some(0));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!limiter.admit("client"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.admit("client"));
        assert_eq!(limiter.remaining("client"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::single(1, Duration::from_secs(60)).unwrap();

        assert!(limiter.admit("alice"));
        assert!(!limiter.admit("alice"));
        assert!(limiter.admit("bob"));

        let mut keys = limiter.tracked_keys();
        keys.sort();
        assert_eq!(keys, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_does_not_consume_other_rules() {
        // 2 per second AND 3 per minute
        let limiter = RateLimiter::new(
            vec![
                RateLimitRule::per_second(2).unwrap(),
                RateLimitRule::per_minute(3).unwrap(),
            ],
            RateLimitStrategy::FixedWindow,
        );

        assert!(limiter.admit("k"));
        assert!(limiter.admit("k"));
        // Per-second rule rejects; the per-minute rule must not be charged.
        assert_eq!(
            limiter.check("k"),
            Admission::Rejected {
                rule: RateLimitRule::per_second(2).unwrap()
            }
        );
        assert!(!limiter.admit("k"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.admit("k"));
        // Per-minute rule is now spent (3 admissions), per-second is not.
        assert_eq!(limiter.remaining("k"), Some(0));
        assert_eq!(
            limiter.check("k"),
            Admission::Rejected {
                rule: RateLimitRule::per_minute(3).unwrap()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_rolls() {
        let limiter = RateLimiter::new(
            vec![RateLimitRule::new(2, Duration::from_secs(10)).unwrap()],
            RateLimitStrategy::SlidingWindow,
        );

        assert!(limiter.admit("k"));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.admit("k"));
        assert!(!limiter.admit("k"));

        // First admission expires at t=10, second at t=16.
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.admit("k"));
        assert!(!limiter.admit("k"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.remaining("k"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_allows_burst_at_boundary() {
        // Unlike the sliding log, a fixed window fully resets at its boundary.
        let limiter = RateLimiter::single(2, Duration::from_secs(10)).unwrap();

        assert!(limiter.admit("k"));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.admit("k"));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.admit("k"));
        assert!(limiter.admit("k"));
        assert!(!limiter.admit("k"));
    }

    #[test]
    fn test_window_elapsed_ignores_backward_time() {
        let start = Instant::now();
        let earlier = start - Duration::from_secs(5);
        assert!(!window_elapsed(earlier, start, Duration::from_secs(1)));
        assert!(window_elapsed(
            start + Duration::from_secs(1),
            start,
            Duration::from_secs(1)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_unlimited() {
        let limiter = RateLimiter::single(1, Duration::from_secs(60)).unwrap();
        assert!(limiter.admit("k"));
        assert!(!limiter.admit("k"));
        limiter.reset("k");
        assert!(limiter.admit("k"));

        let open = RateLimiter::unlimited();
        for _ in 0..1000 {
            assert!(open.admit("k"));
        }
        assert_eq!(open.remaining("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_execute() {
        let limiter = RateLimiter::single(1, Duration::from_secs(1)).unwrap();

        let ok = limiter
            .try_execute("k", || async { Ok::<_, std::io::Error>(7) })
            .await;
        assert_eq!(ok.unwrap(), 7);

        let limited = limiter
            .try_execute("k", || async { Ok::<_, std::io::Error>(7) })
            .await;
        match limited {
            Err(ResilienceError::RateLimited { key, rule }) => {
                assert_eq!(key, "k");
                assert_eq!(rule, "1 per 1 second");
            }
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_admissions_never_exceed_quota() {
        let limiter = RateLimiter::single(50, Duration::from_secs(60)).unwrap();

        let mut handles = Vec::new();
        for _ in 0..200 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.admit("shared") }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 50);
    }
}
