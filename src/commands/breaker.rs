/*!
 * `bulwark breaker`: call a fragile operation through the circuit breaker
 * once per tick and show how the breaker reacts
 */

use bulwark_core_resilience::{CircuitBreaker, CircuitState, ResilienceError};
use std::fmt;
use std::time::Duration;

use super::{timestamp, CallReport};
use crate::cli_style::Theme;
use crate::config::BulwarkConfig;
use crate::error::Result;
use crate::simulate::FlakyService;

#[derive(Debug, Clone, Copy)]
pub struct BreakerDemo {
    pub ticks: u32,
    pub interval: Duration,
}

pub async fn run(
    config: &BulwarkConfig,
    service: &FlakyService,
    demo: BreakerDemo,
    echo: bool,
) -> Result<CallReport> {
    let breaker = CircuitBreaker::new(config.breaker_config())?;
    let mut report = CallReport::default();

    for tick in 1..=demo.ticks {
        let was_open = breaker.state() == CircuitState::Open;
        let result = breaker.call(|| service.call(u64::from(tick))).await;
        report.record(&result);

        if echo {
            println!("{}", describe_tick(&breaker, was_open, &result));
        }

        if tick < demo.ticks {
            tokio::time::sleep(demo.interval).await;
        }
    }

    Ok(report)
}

fn describe_tick<T, E: fmt::Display>(
    breaker: &CircuitBreaker,
    was_open: bool,
    result: &std::result::Result<T, ResilienceError<E>>,
) -> String {
    let stamp = Theme::muted(timestamp());
    match result {
        Ok(_) => format!("{} / {}", stamp, Theme::success("OK")),
        Err(ResilienceError::CircuitOpen) => {
            let wait = breaker
                .remaining_open_time()
                .map(|d| format!(" ({:.1}s until trial)", d.as_secs_f64()))
                .unwrap_or_default();
            format!(
                "{} / {}{}",
                stamp,
                Theme::warning("circuit breaker still open"),
                Theme::muted(wait)
            )
        }
        Err(err) => {
            let mut line = format!("{} / {} / {}", stamp, Theme::error("FAIL"), err);
            if breaker.state() == CircuitState::Open {
                let reason = if was_open {
                    "trial call failed, circuit breaker opened"
                } else {
                    "failures threshold reached, circuit breaker opened"
                };
                line.push_str(&format!(" / {}", Theme::warning(reason)));
            }
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerSection;

    fn config(threshold: u32, reset_secs: u64) -> BulwarkConfig {
        BulwarkConfig {
            breaker: BreakerSection {
                failure_threshold: threshold,
                reset_timeout_secs: reset_secs,
            },
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_dependency_is_shielded() {
        let service = FlakyService::new("fragile", 1.0);
        let demo = BreakerDemo {
            ticks: 10,
            interval: Duration::from_secs(1),
        };

        let report = run(&config(2, 5), &service, demo, false).await.unwrap();

        // Two failures open the breaker, one failed trial at t=6s re-opens it
        assert_eq!(report.failed, 3);
        assert_eq!(report.circuit_open, 7);
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_dependency_passes_through() {
        let service = FlakyService::new("fragile", 0.0);
        let demo = BreakerDemo {
            ticks: 4,
            interval: Duration::from_millis(100),
        };

        let report = run(&config(2, 5), &service, demo, true).await.unwrap();

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.rejected(), 0);
        assert!(report.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_threshold_rejected() {
        let service = FlakyService::new("fragile", 0.0);
        let demo = BreakerDemo {
            ticks: 1,
            interval: Duration::ZERO,
        };
        assert!(run(&config(0, 5), &service, demo, false).await.is_err());
        assert_eq!(service.calls(), 0);
    }
}
