//! Demonstration commands driven end to end from configuration

use bulwark::commands::{self, breaker::BreakerDemo, gate::GateDemo, throttle::ThrottleDemo};
use bulwark::config::BulwarkConfig;
use bulwark::error::EXIT_PARTIAL;
use bulwark::FlakyService;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_breaker_report_marks_partial_failure() {
    let config = BulwarkConfig::demo_preset();
    let broken = FlakyService::new("fragile", 1.0);
    let demo = BreakerDemo {
        ticks: 3,
        interval: Duration::from_secs(1),
    };

    let report = commands::breaker::run(&config, &broken, demo, false)
        .await
        .unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.circuit_open, 1);
    assert_eq!(report.check().unwrap_err().exit_code(), EXIT_PARTIAL);
}

#[tokio::test(start_paused = true)]
async fn test_retry_counts_partial_failures() {
    let mut config = BulwarkConfig::demo_preset();
    config.retry.delay_ms = 10;

    let service = FlakyService::seeded("database", 0.5, 42);
    let report = commands::retry::run(&config, &service, 20, false)
        .await
        .unwrap();

    assert_eq!(report.total, 20);
    assert_eq!(report.succeeded + report.failed, 20);
    assert_eq!(report.rejected(), 0);
    // Every failed connection used all three attempts
    assert!(service.calls() >= 20 + 2 * report.failed);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_two_rules_fixed_window() {
    let mut config = BulwarkConfig::default();
    config.rate_limit.rules = vec!["3 per day".to_string(), "2 per hour".to_string()];

    let demo = ThrottleDemo {
        key: "10.0.0.7".to_string(),
        requests: 6,
        interval: Duration::from_secs(1800),
    };

    // t=0, 0.5h admitted; t=1h admitted (new hour, day has 1 left); rest hit the daily cap
    let report = commands::throttle::run(&config, &demo, false).await.unwrap();
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.rate_limited, 3);
}

#[tokio::test(start_paused = true)]
async fn test_gate_with_healthy_service() {
    let mut config = BulwarkConfig::demo_preset();
    config.rate_limit.rules.clear();

    let service = FlakyService::new("upstream", 0.0).with_latency(Duration::from_millis(20));
    let demo = GateDemo {
        calls: 25,
        concurrency: 5,
        clients: vec!["a".to_string(), "b".to_string()],
    };

    let (report, gate) = commands::gate::run(&config, &service, &demo, false)
        .await
        .unwrap();
    assert_eq!(report.succeeded, 25);
    assert_eq!(gate.circuit_breaker().failure_count(), 0);
    assert!(report.check().is_ok());
}
