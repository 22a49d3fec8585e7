mod aggregate;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod ndjson;
mod orchestrator;
pub mod report;

pub use aggregate::RunSummary;
pub use config::{Config, LogLevel, Scheme};
pub use orchestrator::{Orchestrator, RunOptions, RunOutcome, Strategy};

use anyhow::{Context, Result};
use colored::Colorize;
use std::io;
use tokio_util::sync::CancellationToken;

use crate::client::VitalFrogClient;
use crate::consumer::PollDelay;
use crate::report::Palette;

/// Run one report as configured and print the results. Async runs consume no
/// rows and return an empty summary.
pub async fn run(config: Config, cancel: CancellationToken) -> Result<RunSummary> {
    config.check().context("invalid configuration")?;
    let report_config = config.to_report_config()?;

    let options = RunOptions {
        mode: config.submit_mode(),
        strategy: if config.stream_results {
            Strategy::Streaming
        } else {
            Strategy::Polling
        },
        poll_delay: PollDelay::default(),
        timeout: config.report_timeout(),
        palette: Palette::default(),
    };
    let palette = options.palette;

    println!(
        "{} Submitting report for {}",
        ">>".yellow(),
        report_config.target.host.cyan().bold()
    );

    let client = VitalFrogClient::new(config.api_base_url, config.api_token);
    let orchestrator = Orchestrator::new(client, options);
    let outcome = orchestrator.run(&report_config, cancel).await?;

    let mut stdout = io::stdout();
    report::write_footer(
        &mut stdout,
        &outcome.metadata.config,
        outcome.budgets.as_ref(),
    )?;

    match outcome.summary {
        Some(summary) => {
            report::write_verdict(&mut stdout, &summary, &palette)?;
            Ok(summary)
        }
        None => Ok(RunSummary::default()),
    }
}
