//! Report run orchestrator - submission, budgets, consumption

use anyhow::{Context, Result};
use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregate::RunSummary;
use crate::client::{SubmitMode, VitalFrogClient};
use crate::consumer::{PollDelay, PollingConsumer, ReportStreamConsumer, StreamingConsumer};
use crate::error::ConsumeError;
use crate::models::{PerformanceBudgets, ReportConfig, ReportMetadata};
use crate::ndjson::ReportStream;
use crate::report::{self, Palette, TableSink};

/// How rows of a synchronous report are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Polling,
    Streaming,
}

/// Options for a report run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: SubmitMode,
    pub strategy: Strategy,
    pub poll_delay: PollDelay,
    /// Deadline for the whole run, submission included. No deadline when unset.
    pub timeout: Option<Duration>,
    pub palette: Palette,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: SubmitMode::Sync,
            strategy: Strategy::Polling,
            poll_delay: PollDelay::default(),
            timeout: None,
            palette: Palette::default(),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub metadata: ReportMetadata,
    pub budgets: Option<PerformanceBudgets>,
    /// `None` for async runs, whose rows are never fetched
    pub summary: Option<RunSummary>,
}

/// Submitted report, before any row is consumed.
enum Submission {
    Metadata(ReportMetadata),
    Stream(ReportStream),
}

impl Submission {
    fn metadata(&self) -> &ReportMetadata {
        match self {
            Submission::Metadata(metadata) => metadata,
            Submission::Stream(stream) => &stream.metadata,
        }
    }
}

/// Orchestrator for report runs
pub struct Orchestrator {
    client: VitalFrogClient,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(client: VitalFrogClient, options: RunOptions) -> Self {
        Self { client, options }
    }

    /// Submit `config`, print the run info and, for synchronous runs, render
    /// every row into a table on stdout.
    ///
    /// Every request observes `cancel`; a cancelled run fails with
    /// [`ConsumeError::Cancelled`].
    pub async fn run(&self, config: &ReportConfig, cancel: CancellationToken) -> Result<RunOutcome> {
        let _deadline = self
            .options
            .timeout
            .map(|timeout| Deadline::start(timeout, cancel.clone()));

        let submission = until_cancelled(&cancel, self.submit(config)).await?;
        let metadata = submission.metadata().clone();

        // Budgets are only known once the service resolved the effective config.
        let budgets = match metadata.config.performance_budgets_id {
            Some(id) => Some(
                until_cancelled(&cancel, async {
                    self.client
                        .get_performance_budgets(id)
                        .await
                        .with_context(|| format!("could not get performance budgets {}", id))
                })
                .await?,
            ),
            None => None,
        };

        let mut stdout = io::stdout();
        report::write_run_info(&mut stdout, &metadata)?;

        if self.options.mode == SubmitMode::Async {
            debug!(uuid = %metadata.uuid, "async report, not waiting for rows");
            return Ok(RunOutcome {
                metadata,
                budgets,
                summary: None,
            });
        }

        let mut consumer: Box<dyn ReportStreamConsumer> = match submission {
            Submission::Stream(stream) => Box::new(StreamingConsumer::new(stream)),
            Submission::Metadata(submitted) => Box::new(
                PollingConsumer::new(self.client.clone(), submitted.uuid)
                    .with_delay(self.options.poll_delay),
            ),
        };

        let mut sink = TableSink::new(io::stdout(), self.options.palette);
        sink.write_header()?;

        let summary = consumer
            .consume(budgets.as_ref(), &mut sink, &cancel)
            .await
            .with_context(|| format!("could not consume report {}", metadata.uuid))?;
        sink.into_inner().flush()?;

        Ok(RunOutcome {
            metadata,
            budgets,
            summary: Some(summary),
        })
    }

    async fn submit(&self, config: &ReportConfig) -> Result<Submission> {
        if self.options.mode == SubmitMode::Sync && self.options.strategy == Strategy::Streaming {
            let stream = self
                .client
                .create_streamed_report(config)
                .await
                .context("could not create streamed report")?;
            return Ok(Submission::Stream(stream));
        }

        let metadata = self
            .client
            .create_report(config, self.options.mode)
            .await
            .context("could not create report")?;
        Ok(Submission::Metadata(metadata))
    }
}

/// Race `fut` against `cancel`.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("report run cancelled while waiting on the service");
            Err(ConsumeError::Cancelled.into())
        }
        result = fut => result,
    }
}

/// Cancels a token once `timeout` elapses. Stopped when dropped.
struct Deadline(JoinHandle<()>);

impl Deadline {
    fn start(timeout: Duration, cancel: CancellationToken) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(?timeout, "report deadline reached");
            cancel.cancel();
        }))
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.0.abort();
    }
}
