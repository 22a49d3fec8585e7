//! Run-wide severity aggregation.

use serde::{Deserialize, Serialize};

use crate::evaluator::{ClassifiedRow, MetricCell, Severity};

/// Totals over every row consumed in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Rows rendered
    pub rows: usize,
    /// Budgeted metrics in the warning tier
    pub warnings: usize,
    /// Budgeted metrics in the error tier
    pub errors: usize,
    /// Worst tier seen across all rows
    pub highest: Severity,
}

impl RunSummary {
    pub fn record(&mut self, row: &ClassifiedRow) {
        self.rows += 1;
        for cell in cells(row) {
            match cell.severity {
                Some(Severity::Warning) => self.warnings += 1,
                Some(Severity::Error) => self.errors += 1,
                _ => {}
            }
        }
        self.highest = self.highest.max(row.highest);
    }

    /// Whether the run should fail a CI pipeline.
    pub fn is_failure(&self) -> bool {
        self.highest == Severity::Error
    }

    pub fn verdict(&self) -> &'static str {
        match self.highest {
            Severity::Good => "All metrics are in a good shape. Nothing to do.",
            Severity::Warning => {
                "You have a few metrics which you should look at as they are in the warning state. Please check above table."
            }
            Severity::Error => {
                "Got at least one metric which is not within an acceptable performance budget. Please check above table. (Marked with '✖')"
            }
        }
    }
}

fn cells(row: &ClassifiedRow) -> [&MetricCell; 5] {
    [
        &row.max_potential_fid,
        &row.server_response_time,
        &row.interactive,
        &row.cumulative_layout_shift,
        &row.largest_contentful_paint,
    ]
}
