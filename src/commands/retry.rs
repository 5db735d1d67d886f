/*!
 * `bulwark retry`: simulated database connections driven through the retry
 * controller
 */

use bulwark_core_resilience::ResilienceError;
use tracing::info;

use super::CallReport;
use crate::cli_style::Theme;
use crate::config::BulwarkConfig;
use crate::error::Result;
use crate::simulate::FlakyService;

pub async fn run(
    config: &BulwarkConfig,
    service: &FlakyService,
    connections: u32,
    echo: bool,
) -> Result<CallReport> {
    let policy = config.retry_policy()?;
    let mut report = CallReport::default();

    for connection in 1..=connections {
        info!(connection, "Connection #{}", connection);

        let result = policy
            .execute(|| service.call(u64::from(connection)))
            .await
            .map_err(ResilienceError::from);
        report.record(&result);

        if echo {
            match &result {
                Ok(message) => println!("--> {}", Theme::success(message)),
                Err(err) => println!(
                    "--> {}",
                    Theme::error(format!("Failure after all {} attempts.", err.attempts()))
                ),
            }
        }
    }

    Ok(report)
}
