//! Incremental report consumption.
//!
//! Rows of a running report arrive either by polling the report envelope or on
//! a long-lived NDJSON response. Both strategies classify each new row, push it
//! into a [`RowSink`] in arrival order and aggregate the worst severity.

use async_trait::async_trait;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::RunSummary;
use crate::error::{ApiError, ConsumeError};
use crate::evaluator::{classify, ClassifiedRow};
use crate::models::{PerformanceBudgets, PerformanceReport, Report};
use crate::ndjson::{decode_row, LineReader, ReportStream};

/// Capacity of the handoff between the stream decode worker and the consumer.
pub const ROW_BUFFER: usize = 32;

/// Receives classified rows. Append-only; rows arrive in service order.
pub trait RowSink: Send {
    fn render_row(&mut self, row: &ClassifiedRow) -> std::io::Result<()>;
}

/// Anything that can fetch the current state of a report.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_report(&self, uuid: &str) -> Result<Report, ApiError>;
}

/// Drives one report to completion.
#[async_trait]
pub trait ReportStreamConsumer: Send {
    /// Consume every remaining row of the report. Returns early with
    /// [`ConsumeError::Cancelled`] once `cancel` fires; rows already handed to
    /// `sink` stay rendered.
    async fn consume(
        &mut self,
        budgets: Option<&PerformanceBudgets>,
        sink: &mut dyn RowSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ConsumeError>;
}

/// Bounds of the randomized wait between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollDelay {
    pub min: Duration,
    pub max: Duration,
}

impl Default for PollDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1000),
            max: Duration::from_millis(5000),
        }
    }
}

impl PollDelay {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    fn next(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..self.max)
    }
}

/// Polls `GET /reports/{uuid}` until the envelope is marked finished.
///
/// Every poll returns the full row set so far; ids already seen are skipped.
pub struct PollingConsumer<S> {
    source: S,
    uuid: String,
    delay: PollDelay,
    seen: HashSet<i32>,
}

impl<S: ReportSource> PollingConsumer<S> {
    pub fn new(source: S, uuid: impl Into<String>) -> Self {
        Self {
            source,
            uuid: uuid.into(),
            delay: PollDelay::default(),
            seen: HashSet::new(),
        }
    }

    pub fn with_delay(mut self, delay: PollDelay) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl<S: ReportSource> ReportStreamConsumer for PollingConsumer<S> {
    async fn consume(
        &mut self,
        budgets: Option<&PerformanceBudgets>,
        sink: &mut dyn RowSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ConsumeError> {
        let mut summary = RunSummary::default();
        let mut polls = 0u32;

        loop {
            let delay = self.delay.next();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&summary)),
                _ = tokio::time::sleep(delay) => {}
            }

            let report = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&summary)),
                report = self.source.fetch_report(&self.uuid) => report?,
            };
            polls += 1;

            let finished = report.is_finished();
            let delivered = report.data.len();
            let mut fresh = 0usize;
            for row in report.data {
                if !self.seen.insert(row.id) {
                    continue;
                }
                fresh += 1;
                emit(row, budgets, sink, &mut summary)?;
            }
            debug!(
                uuid = %self.uuid,
                poll = polls,
                delivered,
                fresh,
                finished,
                "polled report"
            );

            if finished {
                break;
            }
        }

        info!(
            uuid = %self.uuid,
            rows = summary.rows,
            highest = %summary.highest,
            polls,
            "report finished"
        );
        Ok(summary)
    }
}

/// Consumes the rows of a streamed report.
///
/// A background task reads and decodes lines and hands rows over a bounded
/// channel, so a slow sink applies backpressure to the transport read.
pub struct StreamingConsumer {
    uuid: String,
    lines: Option<LineReader>,
    capacity: usize,
}

impl StreamingConsumer {
    pub fn new(stream: ReportStream) -> Self {
        Self {
            uuid: stream.metadata.uuid,
            lines: Some(stream.lines),
            capacity: ROW_BUFFER,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

#[async_trait]
impl ReportStreamConsumer for StreamingConsumer {
    async fn consume(
        &mut self,
        budgets: Option<&PerformanceBudgets>,
        sink: &mut dyn RowSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ConsumeError> {
        let Some(lines) = self.lines.take() else {
            debug!(uuid = %self.uuid, "report stream already consumed");
            return Ok(RunSummary::default());
        };

        let (tx, mut rx) = mpsc::channel(self.capacity);
        let shutdown = cancel.child_token();
        let worker = tokio::spawn(decode_rows(lines, tx, shutdown.clone()));

        let mut summary = RunSummary::default();
        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(cancelled(&summary)),
                next = rx.recv() => next,
            };
            match next {
                Some(Ok(row)) => {
                    if let Err(e) = emit(row, budgets, sink, &mut summary) {
                        break Err(e);
                    }
                }
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(summary),
            }
        };

        // Stops the worker if it is still reading and drops the transport with it.
        shutdown.cancel();
        drop(rx);
        worker.await?;

        if let Ok(summary) = &result {
            info!(
                uuid = %self.uuid,
                rows = summary.rows,
                highest = %summary.highest,
                "report stream ended"
            );
        }
        result
    }
}

/// Reads lines until end of input, decode failure, cancellation or a closed
/// receiver. The first error is forwarded and ends the worker.
async fn decode_rows(
    mut lines: LineReader,
    tx: mpsc::Sender<Result<PerformanceReport, ApiError>>,
    shutdown: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };
        let item = match line {
            Ok(Some(line)) => decode_row(&line),
            Ok(None) => return,
            Err(e) => Err(e),
        };
        let failed = item.is_err();

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            sent = tx.send(item) => {
                if sent.is_err() {
                    return;
                }
            }
        }
        if failed {
            return;
        }
    }
}

fn emit(
    row: PerformanceReport,
    budgets: Option<&PerformanceBudgets>,
    sink: &mut dyn RowSink,
    summary: &mut RunSummary,
) -> Result<(), ConsumeError> {
    let classified = classify(row, budgets);
    debug!(
        id = classified.report.id,
        path = %classified.report.path,
        highest = %classified.highest,
        "row classified"
    );
    sink.render_row(&classified)?;
    summary.record(&classified);
    Ok(())
}

fn cancelled(summary: &RunSummary) -> ConsumeError {
    warn!(rows = summary.rows, "report consumption cancelled");
    ConsumeError::Cancelled
}
