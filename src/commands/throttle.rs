/*!
 * `bulwark throttle`: fire requests for one client key against the
 * configured rate limits
 */

use std::convert::Infallible;
use std::time::Duration;

use super::{timestamp, CallReport};
use crate::cli_style::Theme;
use crate::config::BulwarkConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ThrottleDemo {
    pub key: String,
    pub requests: u32,
    pub interval: Duration,
}

pub async fn run(config: &BulwarkConfig, demo: &ThrottleDemo, echo: bool) -> Result<CallReport> {
    let limiter = config.rate_limiter()?;
    let mut report = CallReport::default();

    for request in 1..=demo.requests {
        let result = limiter
            .try_execute(&demo.key, || async { Ok::<_, Infallible>(request) })
            .await;
        report.record(&result);

        if echo {
            let status = match &result {
                Ok(_) => Theme::success("200".to_string()),
                Err(err) => Theme::error(format!("429 Too Many Requests: {}", err)),
            };
            println!(
                "{} - - [{}] \"GET /limited\" {}",
                demo.key,
                Theme::muted(timestamp()),
                status
            );
        }

        if request < demo.requests && !demo.interval.is_zero() {
            tokio::time::sleep(demo.interval).await;
        }
    }

    Ok(report)
}
