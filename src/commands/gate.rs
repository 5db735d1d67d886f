/*!
 * `bulwark gate`: concurrent calls through the full Resilience Gate
 */

use bulwark_core_resilience::{ResilienceError, ResilienceGate};
use futures::stream::{self, StreamExt};

use super::CallReport;
use crate::cli_style::{Icons, Theme};
use crate::config::BulwarkConfig;
use crate::error::Result;
use crate::simulate::FlakyService;

/// Rate-limit key used when no client keys are given
pub const DEFAULT_CLIENT: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct GateDemo {
    pub calls: u32,
    /// Calls in flight at once
    pub concurrency: usize,
    /// Client keys assigned round-robin
    pub clients: Vec<String>,
}

impl GateDemo {
    fn client_for(&self, call: u32) -> &str {
        if self.clients.is_empty() {
            return DEFAULT_CLIENT;
        }
        let idx = (call as usize - 1) % self.clients.len();
        &self.clients[idx]
    }
}

/// Run the demo and return the gate alongside the report so callers can
/// show final breaker state
pub async fn run(
    config: &BulwarkConfig,
    service: &FlakyService,
    demo: &GateDemo,
    echo: bool,
) -> Result<(CallReport, ResilienceGate)> {
    let gate = config.build_gate()?;

    let outcomes: Vec<_> = stream::iter(1..=demo.calls)
        .map(|call| {
            let gate = &gate;
            let client = demo.client_for(call);
            async move {
                let result = gate
                    .invoke(client, || service.call(u64::from(call)))
                    .await;
                (call, client, result)
            }
        })
        .buffer_unordered(demo.concurrency.max(1))
        .collect()
        .await;

    let mut report = CallReport::default();
    for (call, client, result) in &outcomes {
        report.record(result);
        if echo {
            println!("{}", describe_call(*call, client, result));
        }
    }

    Ok((report, gate))
}

fn describe_call<E: std::fmt::Display>(
    call: u32,
    client: &str,
    result: &std::result::Result<String, ResilienceError<E>>,
) -> String {
    let prefix = format!("call #{:<3} [{}]", call, client);
    match result {
        Ok(value) => format!("{} {} {}", prefix, Theme::success(Icons::SUCCESS), value),
        Err(err) if err.is_rejection() => format!(
            "{} {} {}",
            prefix,
            Theme::warning(Icons::WARNING),
            Theme::warning(err)
        ),
        Err(err) => format!("{} {} {}", prefix, Theme::error(Icons::ERROR), err),
    }
}
