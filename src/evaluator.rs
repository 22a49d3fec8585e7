//! Budget evaluation and row classification.
//!
//! Pure functions: a metric value is compared against one budget's thresholds,
//! and a whole row is classified against every budget of a set.

use serde::{Deserialize, Serialize};

use crate::models::{Budget, BudgetMetric, BudgetMode, PerformanceBudgets, PerformanceReport};

/// Prefix for values outside their error threshold.
pub const ERROR_MARKER: &str = "✖";

/// Budget tier of a metric. Ordered, so the worst of several is their max.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Good = 0,
    Warning = 1,
    Error = 2,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Good => write!(f, "good"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Outcome of comparing one value against one budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub severity: Severity,
    pub value: i32,
}

/// Compare `value` against a budget's thresholds, honoring its direction.
pub fn evaluate(value: i32, budget: &Budget) -> Evaluation {
    let severity = match budget.mode() {
        BudgetMode::Above => {
            if value < budget.warning {
                Severity::Good
            } else if value < budget.error {
                Severity::Warning
            } else {
                Severity::Error
            }
        }
        BudgetMode::Below => {
            if value > budget.warning {
                Severity::Good
            } else if value > budget.error {
                Severity::Warning
            } else {
                Severity::Error
            }
        }
    };
    Evaluation { severity, value }
}

/// Value of `metric` on a row, on the scale budgets use. `None` for metrics the
/// row does not carry.
pub fn metric_value(report: &PerformanceReport, metric: BudgetMetric) -> Option<i32> {
    match metric {
        BudgetMetric::LargestContentfulPaintMs => Some(report.largest_contentful_paint.value_ms),
        BudgetMetric::MaxPotentialFidMs => Some(report.max_potential_fid_ms),
        BudgetMetric::CumulativeLayoutShift => Some(report.cumulative_layout_shift.scaled()),
        BudgetMetric::ServerResponseTimeMs => Some(report.server_response_time_ms),
        BudgetMetric::InteractiveMs => Some(report.interactive_ms),
        BudgetMetric::Unknown => None,
    }
}

/// Display text of one metric and its budget tier, if a budget covers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricCell {
    pub text: String,
    pub severity: Option<Severity>,
}

impl MetricCell {
    fn unbudgeted(text: String) -> Self {
        Self {
            text,
            severity: None,
        }
    }

    fn apply(&mut self, severity: Severity) {
        if severity == Severity::Error && self.severity != Some(Severity::Error) {
            self.text = format!("{} {}", ERROR_MARKER, self.text);
        }
        self.severity = Some(self.severity.map_or(severity, |s| s.max(severity)));
    }

    pub fn is_marked(&self) -> bool {
        self.text.starts_with(ERROR_MARKER)
    }
}

/// A row together with the classification of its metrics.
#[derive(Debug, Clone)]
pub struct ClassifiedRow {
    pub report: PerformanceReport,
    pub max_potential_fid: MetricCell,
    pub server_response_time: MetricCell,
    pub interactive: MetricCell,
    pub cumulative_layout_shift: MetricCell,
    pub largest_contentful_paint: MetricCell,
    /// Worst tier over every budgeted metric of the row
    pub highest: Severity,
}

impl ClassifiedRow {
    fn cell_mut(&mut self, metric: BudgetMetric) -> Option<&mut MetricCell> {
        match metric {
            BudgetMetric::LargestContentfulPaintMs => Some(&mut self.largest_contentful_paint),
            BudgetMetric::MaxPotentialFidMs => Some(&mut self.max_potential_fid),
            BudgetMetric::CumulativeLayoutShift => Some(&mut self.cumulative_layout_shift),
            BudgetMetric::ServerResponseTimeMs => Some(&mut self.server_response_time),
            BudgetMetric::InteractiveMs => Some(&mut self.interactive),
            BudgetMetric::Unknown => None,
        }
    }
}

/// Classify every metric of `report` against `budgets`.
///
/// Without a budget set the row is left unclassified and counts as good.
pub fn classify(report: PerformanceReport, budgets: Option<&PerformanceBudgets>) -> ClassifiedRow {
    let mut row = ClassifiedRow {
        max_potential_fid: MetricCell::unbudgeted(format!("{}ms", report.max_potential_fid_ms)),
        server_response_time: MetricCell::unbudgeted(format!(
            "{}ms",
            report.server_response_time_ms
        )),
        interactive: MetricCell::unbudgeted(format!("{}ms", report.interactive_ms)),
        cumulative_layout_shift: MetricCell::unbudgeted(format!(
            "{:.6}",
            report.cumulative_layout_shift.value
        )),
        largest_contentful_paint: MetricCell::unbudgeted(format!(
            "{}ms",
            report.largest_contentful_paint.value_ms
        )),
        highest: Severity::Good,
        report,
    };

    let Some(budgets) = budgets else {
        return row;
    };

    for budget in &budgets.budgets {
        let Some(value) = metric_value(&row.report, budget.metric) else {
            continue;
        };
        let evaluation = evaluate(value, budget);
        if let Some(cell) = row.cell_mut(budget.metric) {
            cell.apply(evaluation.severity);
        }
        row.highest = row.highest.max(evaluation.severity);
    }

    row
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{
        Country, CumulativeLayoutShift, Device, DeviceName, Element, LargestContentfulPaint,
    };

    pub(crate) fn budget(
        metric: BudgetMetric,
        warning: i32,
        error: i32,
        mode: Option<BudgetMode>,
    ) -> Budget {
        Budget {
            metric,
            warning,
            error,
            mode,
        }
    }

    pub(crate) fn row(id: i32, server_response_time_ms: i32) -> PerformanceReport {
        PerformanceReport {
            id,
            path: "/".to_string(),
            device: Device {
                name: DeviceName::Desktop,
            },
            country: Country {
                code: "US".to_string(),
            },
            max_potential_fid_ms: 40,
            server_response_time_ms,
            interactive_ms: 1800,
            cumulative_layout_shift: CumulativeLayoutShift {
                value: 0.05,
                elements: None,
            },
            largest_contentful_paint: LargestContentfulPaint {
                value_ms: 1200,
                element: Some(Element {
                    selector: "body > main > img".to_string(),
                }),
            },
        }
    }

    fn severity(value: i32, budget: &Budget) -> Severity {
        evaluate(value, budget).severity
    }

    #[test]
    fn above_thresholds() {
        let b = budget(BudgetMetric::ServerResponseTimeMs, 200, 500, None);
        assert_eq!(severity(199, &b), Severity::Good);
        assert_eq!(severity(200, &b), Severity::Warning);
        assert_eq!(severity(499, &b), Severity::Warning);
        assert_eq!(severity(500, &b), Severity::Error);
        assert_eq!(severity(10_000, &b), Severity::Error);
    }

    #[test]
    fn explicit_above_matches_default() {
        let implicit = budget(BudgetMetric::InteractiveMs, 10, 20, None);
        let explicit = budget(BudgetMetric::InteractiveMs, 10, 20, Some(BudgetMode::Above));
        for value in [-5, 0, 9, 10, 19, 20, 21] {
            assert_eq!(severity(value, &implicit), severity(value, &explicit));
        }
    }

    #[test]
    fn below_thresholds() {
        let b = budget(BudgetMetric::InteractiveMs, 50, 20, Some(BudgetMode::Below));
        assert_eq!(severity(51, &b), Severity::Good);
        assert_eq!(severity(50, &b), Severity::Warning);
        assert_eq!(severity(21, &b), Severity::Warning);
        assert_eq!(severity(20, &b), Severity::Error);
        assert_eq!(severity(0, &b), Severity::Error);
    }

    #[test]
    fn evaluation_echoes_value() {
        let b = budget(BudgetMetric::MaxPotentialFidMs, 100, 300, None);
        assert_eq!(evaluate(42, &b).value, 42);
    }

    #[test]
    fn cls_compared_on_scaled_value() {
        let mut report = row(1, 100);
        report.cumulative_layout_shift.value = 0.251;
        let budgets = PerformanceBudgets {
            id: 1,
            name: None,
            budgets: vec![budget(BudgetMetric::CumulativeLayoutShift, 10, 26, None)],
        };
        let classified = classify(report, Some(&budgets));
        assert_eq!(
            classified.cumulative_layout_shift.severity,
            Some(Severity::Warning)
        );
        assert_eq!(classified.highest, Severity::Warning);
    }

    #[test]
    fn server_response_over_error_is_marked() {
        let budgets = PerformanceBudgets {
            id: 7,
            name: None,
            budgets: vec![budget(
                BudgetMetric::ServerResponseTimeMs,
                200,
                500,
                Some(BudgetMode::Above),
            )],
        };
        let classified = classify(row(1, 600), Some(&budgets));
        assert_eq!(classified.server_response_time.severity, Some(Severity::Error));
        assert_eq!(classified.server_response_time.text, "✖ 600ms");
        assert!(classified.server_response_time.is_marked());
        assert_eq!(classified.highest, Severity::Error);
        assert_eq!(classified.interactive.severity, None);
        assert!(!classified.interactive.is_marked());
    }

    #[test]
    fn warning_is_not_marked() {
        let budgets = PerformanceBudgets {
            id: 7,
            name: None,
            budgets: vec![budget(BudgetMetric::ServerResponseTimeMs, 200, 500, None)],
        };
        let classified = classify(row(1, 300), Some(&budgets));
        assert_eq!(classified.server_response_time.text, "300ms");
        assert_eq!(classified.highest, Severity::Warning);
    }

    #[test]
    fn unknown_metric_contributes_nothing() {
        let budgets = PerformanceBudgets {
            id: 7,
            name: None,
            budgets: vec![budget(BudgetMetric::Unknown, 0, 0, None)],
        };
        let classified = classify(row(1, 10_000), Some(&budgets));
        assert_eq!(classified.highest, Severity::Good);
    }

    #[test]
    fn no_budget_set_leaves_row_unclassified() {
        let classified = classify(row(1, 10_000), None);
        assert_eq!(classified.highest, Severity::Good);
        assert_eq!(classified.server_response_time.severity, None);
        assert_eq!(classified.cumulative_layout_shift.text, "0.050000");
    }

    #[test]
    fn two_budgets_on_one_metric_mark_once() {
        let budgets = PerformanceBudgets {
            id: 7,
            name: None,
            budgets: vec![
                budget(BudgetMetric::ServerResponseTimeMs, 200, 500, None),
                budget(BudgetMetric::ServerResponseTimeMs, 100, 300, None),
            ],
        };
        let classified = classify(row(1, 600), Some(&budgets));
        assert_eq!(classified.server_response_time.text, "✖ 600ms");
    }

    #[test]
    fn severity_orders_good_warning_error() {
        assert!(Severity::Good < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(Severity::Error as u8, 2);
    }
}
