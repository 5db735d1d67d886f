/*!
 * Bulwark CLI - Command Line Interface
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use bulwark::{
    cli_style::{
        breaker_table, print_error, print_info, print_success, print_warning, section_header,
        stats_table,
    },
    commands::{
        self,
        breaker::BreakerDemo,
        gate::GateDemo,
        throttle::ThrottleDemo,
        CallReport,
    },
    config::{BackoffKind, BulwarkConfig, LogLevel, StrategyKind},
    error::{BulwarkError, Result, EXIT_SUCCESS},
    logging, FlakyService,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bulwark")]
#[command(version, about = "Rate limiting, retries and circuit breaking for unreliable calls", long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults to the demo preset
    #[arg(short = 'c', long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Verbose output (forces debug logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Log level
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stdout
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Consecutive failures before the breaker opens
    #[arg(long, global = true)]
    failure_threshold: Option<u32>,

    /// Seconds the breaker stays open before a trial call
    #[arg(long, global = true)]
    reset_timeout: Option<u64>,

    /// Total attempts per call, including the first
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Delay after a failed attempt, in milliseconds
    #[arg(long, global = true)]
    retry_delay_ms: Option<u64>,

    /// Use exponential backoff for retries
    #[arg(long, global = true)]
    exponential_backoff: bool,

    /// Keep retrying while the breaker rejects attempts
    #[arg(long, global = true)]
    retry_on_open: bool,

    /// Rate limit rule, e.g. "10 per hour" or "2/minute" (repeatable, replaces configured rules)
    #[arg(long = "rule", value_name = "RULE", global = true)]
    rules: Vec<String>,

    /// Rate limit window strategy
    #[arg(long, value_enum, global = true)]
    strategy: Option<StrategyArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a fragile operation through the circuit breaker once per tick
    Breaker {
        #[arg(long, default_value = "30")]
        ticks: u32,

        /// Milliseconds between ticks
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Probability that a call fails (0.0 - 1.0)
        #[arg(long, default_value = "0.5")]
        failure_rate: f64,

        /// Seed for a reproducible failure sequence
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Open simulated database connections through the retry controller
    Retry {
        #[arg(long, default_value = "5")]
        connections: u32,

        #[arg(long, default_value = "0.5")]
        failure_rate: f64,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Send requests for one client against the rate limits
    Throttle {
        /// Rate-limit key (client identity)
        #[arg(long, default_value = "127.0.0.1")]
        key: String,

        #[arg(long, default_value = "12")]
        requests: u32,

        /// Milliseconds between requests
        #[arg(long, default_value = "0")]
        interval_ms: u64,
    },

    /// Run concurrent calls through the full Resilience Gate
    Gate {
        #[arg(long, default_value = "20")]
        calls: u32,

        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Client keys, assigned round-robin (repeatable)
        #[arg(long = "client", value_name = "KEY")]
        clients: Vec<String>,

        #[arg(long, default_value = "0.3")]
        failure_rate: f64,

        /// Simulated latency per call in milliseconds
        #[arg(long, default_value = "50")]
        latency_ms: u64,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Save it to a file instead
        #[arg(long, value_name = "PATH")]
        write: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    FixedWindow,
    SlidingWindow,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::FixedWindow => StrategyKind::FixedWindow,
            StrategyArg::SlidingWindow => StrategyKind::SlidingWindow,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let hint = e
                .is_fatal()
                .then_some("Check the configuration file and command-line flags");
            print_error(&e.to_string(), hint);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let base_config = match cli.config {
        Some(ref path) => BulwarkConfig::from_file(path)?,
        None => BulwarkConfig::demo_preset(),
    };
    let config = apply_overrides(base_config, &cli);
    config.validate()?;

    logging::init_logging(&config)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| BulwarkError::Config(format!("Failed to start async runtime: {}", e)))?;

    runtime.block_on(dispatch(&config, cli.command))
}

/// CLI flags override values from the configuration file
fn apply_overrides(mut config: BulwarkConfig, cli: &Cli) -> BulwarkConfig {
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file.clone();
    }
    config.verbose |= cli.verbose;

    if let Some(threshold) = cli.failure_threshold {
        config.breaker.failure_threshold = threshold;
    }
    if let Some(secs) = cli.reset_timeout {
        config.breaker.reset_timeout_secs = secs;
    }
    if let Some(attempts) = cli.max_attempts {
        config.retry.max_attempts = attempts;
    }
    if let Some(delay) = cli.retry_delay_ms {
        config.retry.delay_ms = delay;
    }
    if cli.exponential_backoff {
        config.retry.backoff = BackoffKind::Exponential;
    }
    config.retry.retry_on_open |= cli.retry_on_open;

    if !cli.rules.is_empty() {
        config.rate_limit.rules = cli.rules.clone();
    }
    if let Some(strategy) = cli.strategy {
        config.rate_limit.strategy = strategy.into();
    }

    config
}

fn flaky(name: &str, failure_rate: f64, seed: Option<u64>) -> FlakyService {
    match seed {
        Some(seed) => FlakyService::seeded(name, failure_rate, seed),
        None => FlakyService::new(name, failure_rate),
    }
}

async fn dispatch(config: &BulwarkConfig, command: Commands) -> Result<()> {
    let report = match command {
        Commands::Breaker {
            ticks,
            interval_ms,
            failure_rate,
            seed,
        } => {
            section_header("Circuit Breaker");
            print_info(&format!(
                "Opens after {} consecutive failures, trial call after {}s",
                config.breaker.failure_threshold, config.breaker.reset_timeout_secs
            ));
            let service = flaky("fragile", failure_rate, seed);
            let demo = BreakerDemo {
                ticks,
                interval: Duration::from_millis(interval_ms),
            };
            commands::breaker::run(config, &service, demo, true).await?
        }

        Commands::Retry {
            connections,
            failure_rate,
            seed,
        } => {
            section_header("Retry");
            print_info(&format!(
                "Up to {} attempts per connection",
                config.retry.max_attempts
            ));
            let service = flaky("database", failure_rate, seed);
            commands::retry::run(config, &service, connections, true).await?
        }

        Commands::Throttle {
            key,
            requests,
            interval_ms,
        } => {
            section_header("Throttling");
            if config.rate_limit.rules.is_empty() {
                print_warning("No rate limit rules configured, every request will be admitted");
            } else {
                print_info(&format!("Limits: {}", config.rate_limit.rules.join(", ")));
            }
            let demo = ThrottleDemo {
                key,
                requests,
                interval: Duration::from_millis(interval_ms),
            };
            commands::throttle::run(config, &demo, true).await?
        }

        Commands::Gate {
            calls,
            concurrency,
            clients,
            failure_rate,
            latency_ms,
            seed,
        } => {
            section_header("Resilience Gate");
            let service = flaky("upstream", failure_rate, seed)
                .with_latency(Duration::from_millis(latency_ms));
            let demo = GateDemo {
                calls,
                concurrency,
                clients,
            };
            let (report, gate) = commands::gate::run(config, &service, &demo, true).await?;

            let breaker = gate.circuit_breaker();
            println!(
                "\n{}",
                breaker_table(&breaker.stats(), breaker.remaining_open_time())
            );
            report
        }

        Commands::Config { write } => return show_config(config, write.as_ref()),
    };

    summarize(report)
}

fn summarize(report: CallReport) -> Result<()> {
    section_header("Summary");
    println!("{}", stats_table(&report.rows()));

    let report = report.check()?;
    print_success(&format!(
        "{} of {} call(s) succeeded, {} rejected",
        report.succeeded,
        report.total,
        report.rejected()
    ));
    Ok(())
}

fn show_config(config: &BulwarkConfig, write: Option<&PathBuf>) -> Result<()> {
    match write {
        Some(path) => {
            config.to_file(path)?;
            print_success(&format!("Configuration written to {}", path.display()));
        }
        None => print!("{}", config.to_toml()?),
    }
    Ok(())
}
