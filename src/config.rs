/*!
 * Configuration types for Bulwark
 */

use bulwark_core_resilience::{
    CircuitBreakerConfig, ConfigError, DelayPolicy, GateConfig, RateLimitRule, RateLimitStrategy,
    RateLimiter, ResilienceGate, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Main configuration: one protected dependency
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BulwarkConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<std::path::PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// Circuit breaker settings
    #[serde(default)]
    pub breaker: BreakerSection,

    /// Retry settings
    #[serde(default)]
    pub retry: RetrySection,

    /// Rate limit settings
    #[serde(default)]
    pub rate_limit: RateLimitSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSection {
    /// Consecutive failures tolerated before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before a trial call
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Growth factor for exponential backoff
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound for exponential backoff, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Keep retrying while the breaker rejects attempts
    #[serde(default)]
    pub retry_on_open: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            backoff: BackoffKind::Fixed,
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            retry_on_open: false,
        }
    }
}

/// Shape of the delay between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// No delay
    None,

    /// Same delay every time
    #[default]
    Fixed,

    /// Delay multiplied after every failure
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RateLimitSection {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Rules such as "100 per day" or "2/minute"; all must pass
    #[serde(default)]
    pub rules: Vec<String>,
}

/// Window accounting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    FixedWindow,
    SlidingWindow,
}

impl From<StrategyKind> for RateLimitStrategy {
    fn from(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::FixedWindow => RateLimitStrategy::FixedWindow,
            StrategyKind::SlidingWindow => RateLimitStrategy::SlidingWindow,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl BulwarkConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BulwarkConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Settings used by the command-line demonstrations: two failures open
    /// the breaker for five seconds, three attempts one second apart, and
    /// "100 per day" plus "10 per hour" per client.
    pub fn demo_preset() -> Self {
        Self {
            breaker: BreakerSection {
                failure_threshold: 2,
                reset_timeout_secs: 5,
            },
            retry: RetrySection {
                max_attempts: 3,
                delay_ms: 1000,
                ..Default::default()
            },
            rate_limit: RateLimitSection {
                strategy: StrategyKind::FixedWindow,
                rules: vec!["100 per day".to_string(), "10 per hour".to_string()],
            },
            ..Default::default()
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            reset_timeout: Duration::from_secs(self.breaker.reset_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> std::result::Result<RetryPolicy, ConfigError> {
        let retry = &self.retry;
        let delay = match retry.backoff {
            BackoffKind::None => DelayPolicy::None,
            BackoffKind::Fixed => DelayPolicy::Fixed(Duration::from_millis(retry.delay_ms)),
            BackoffKind::Exponential => DelayPolicy::exponential(
                Duration::from_millis(retry.delay_ms),
                retry.multiplier,
                Duration::from_millis(retry.max_delay_ms),
            )?,
        };
        RetryPolicy::new(retry.max_attempts, delay)
    }

    pub fn rate_limit_rules(&self) -> std::result::Result<Vec<RateLimitRule>, ConfigError> {
        self.rate_limit.rules.iter().map(|rule| rule.parse()).collect()
    }

    pub fn rate_limiter(&self) -> std::result::Result<RateLimiter, ConfigError> {
        Ok(RateLimiter::new(
            self.rate_limit_rules()?,
            self.rate_limit.strategy.into(),
        ))
    }

    /// Convert to the library's gate configuration, validating every value
    pub fn gate_config(&self) -> std::result::Result<GateConfig, ConfigError> {
        let breaker = self.breaker_config();
        breaker.validate()?;

        Ok(GateConfig {
            breaker,
            retry: self.retry_policy()?,
            rate_limits: self.rate_limit_rules()?,
            strategy: self.rate_limit.strategy.into(),
            retry_on_open: self.retry.retry_on_open,
        })
    }

    /// Check the whole configuration without building anything
    pub fn validate(&self) -> Result<()> {
        self.gate_config()?;
        Ok(())
    }

    pub fn build_gate(&self) -> Result<ResilienceGate> {
        Ok(ResilienceGate::new(self.gate_config()?)?)
    }
}
