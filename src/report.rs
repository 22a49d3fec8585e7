//! Terminal rendering: the results table plus the run header and footer.

use colored::{Color, Colorize};
use std::io::{self, Write};

use crate::aggregate::RunSummary;
use crate::consumer::RowSink;
use crate::evaluator::{ClassifiedRow, MetricCell, Severity};
use crate::models::{PerformanceBudgets, ReportConfig, ReportMetadata};

pub const REPORT_WEB_URL: &str = "https://app.vitalfrog.com/report";

pub const BANNER: &str = r#"
 _|      _|   _|     _|                  _|   _|_|_|_|
 _|      _|        _|_|_|_|     _|_|_|   _|   _|         _|  _|_|     _|_|       _|_|_|
 _|      _|   _|     _|       _|    _|   _|   _|_|_|     _|_|       _|    _|   _|    _|
   _|  _|     _|     _|       _|    _|   _|   _|         _|         _|    _|   _|    _|
     _|       _|       _|_|     _|_|_|   _|   _|         _|           _|_|       _|_|_|
                                                                                     _|
                                                                                 _|_|    "#;

const SECTION: &str = "----------";
const SEPARATOR: &str = " | ";

/// Nominal column widths.
const PATH_WIDTH: usize = 30;
const COUNTRY_WIDTH: usize = 4;
const DEVICE_WIDTH: usize = 10;
const METRIC_WIDTH: usize = 10;
const SELECTOR_WIDTH: usize = 40;

const HEADER: [(&str, usize); 8] = [
    ("Path", PATH_WIDTH),
    ("Country", COUNTRY_WIDTH),
    ("Device", DEVICE_WIDTH),
    ("Max First Input Delay", METRIC_WIDTH),
    ("Server response time", METRIC_WIDTH),
    ("Time to interactive", METRIC_WIDTH),
    ("Cumulative Layout Shift", SELECTOR_WIDTH),
    ("Largest Contentful Paint", SELECTOR_WIDTH),
];

/// Severity to color mapping. Metrics without a budget use `neutral`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub good: Color,
    pub warning: Color,
    pub error: Color,
    pub neutral: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            good: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            neutral: Color::White,
        }
    }
}

impl Palette {
    pub fn color(&self, severity: Option<Severity>) -> Color {
        match severity {
            Some(Severity::Good) => self.good,
            Some(Severity::Warning) => self.warning,
            Some(Severity::Error) => self.error,
            None => self.neutral,
        }
    }
}

/// Width of each column: its nominal width, widened to fit the header name.
fn column_widths() -> [usize; 8] {
    HEADER.map(|(name, width)| name.chars().count().max(width))
}

/// Text of one table cell and its color, if any.
type Cell<'a> = (&'a str, Option<Color>);

/// Writes classified rows as a fixed-width table.
pub struct TableSink<W> {
    out: W,
    palette: Palette,
    widths: [usize; 8],
}

impl<W: Write + Send> TableSink<W> {
    pub fn new(out: W, palette: Palette) -> Self {
        Self {
            out,
            palette,
            widths: column_widths(),
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        let cells: [Cell; 8] = HEADER.map(|(name, _)| (name, None));
        self.write_cells(&cells)?;
        self.write_divider('=')
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn metric<'a>(&self, cell: &'a MetricCell) -> Cell<'a> {
        (cell.text.as_str(), Some(self.palette.color(cell.severity)))
    }

    fn write_cells(&mut self, cells: &[Cell]) -> io::Result<()> {
        let line = cells
            .iter()
            .zip(self.widths)
            .map(|((text, color), width)| {
                let padded = format!("{:<width$}", truncate(text, width), width = width);
                match color {
                    Some(color) => padded.color(*color).to_string(),
                    None => padded,
                }
            })
            .collect::<Vec<_>>()
            .join(SEPARATOR);
        writeln!(self.out, "{}", line.trim_end())
    }

    fn write_divider(&mut self, ch: char) -> io::Result<()> {
        let width =
            self.widths.iter().sum::<usize>() + SEPARATOR.len() * (self.widths.len() - 1);
        writeln!(self.out, "{}", ch.to_string().repeat(width))
    }

    fn write_breadcrumbs(&mut self, row: &ClassifiedRow) -> io::Result<()> {
        let cls: Vec<String> = row
            .report
            .cumulative_layout_shift
            .elements
            .iter()
            .flatten()
            .flat_map(|el| selector_breadcrumbs(&el.selector))
            .collect();
        let lcp = row
            .report
            .largest_contentful_paint
            .element
            .as_ref()
            .map(|el| selector_breadcrumbs(&el.selector))
            .unwrap_or_default();

        for (cls, lcp) in breadcrumb_rows(&cls, &lcp) {
            let cells: [Cell; 8] = [
                ("", None),
                ("", None),
                ("", None),
                ("", None),
                ("", None),
                ("", None),
                (cls.as_str(), None),
                (lcp.as_str(), None),
            ];
            self.write_cells(&cells)?;
        }
        Ok(())
    }
}

impl<W: Write + Send> RowSink for TableSink<W> {
    fn render_row(&mut self, row: &ClassifiedRow) -> io::Result<()> {
        let device = row.report.device.name.to_string();
        let cells: [Cell; 8] = [
            (row.report.path.as_str(), None),
            (row.report.country.code.as_str(), None),
            (device.as_str(), None),
            self.metric(&row.max_potential_fid),
            self.metric(&row.server_response_time),
            self.metric(&row.interactive),
            self.metric(&row.cumulative_layout_shift),
            self.metric(&row.largest_contentful_paint),
        ];
        self.write_cells(&cells)?;
        self.write_breadcrumbs(row)?;
        self.write_divider('-')?;
        self.out.flush()
    }
}

/// Split a `>` separated selector into one line per element, indented by depth.
pub fn selector_breadcrumbs(selector: &str) -> Vec<String> {
    selector
        .split('>')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .enumerate()
        .map(|(depth, part)| {
            if depth == 0 {
                part.to_string()
            } else {
                format!("{}>{}", " ".repeat(depth), part)
            }
        })
        .collect()
}

/// Pair up CLS and LCP breadcrumbs by index, padding the shorter side.
pub fn breadcrumb_rows(cls: &[String], lcp: &[String]) -> Vec<(String, String)> {
    let len = cls.len().max(lcp.len());
    (0..len)
        .map(|i| {
            (
                cls.get(i).cloned().unwrap_or_default(),
                lcp.get(i).cloned().unwrap_or_default(),
            )
        })
        .collect()
}

/// Creation time, cost and web link of a submitted report.
pub fn write_run_info(out: &mut impl Write, metadata: &ReportMetadata) -> io::Result<()> {
    writeln!(out, "\n{}\n", SECTION)?;
    writeln!(
        out,
        "Created at {}",
        metadata.created.format("%d %b %y %H:%M UTC")
    )?;
    writeln!(out, "Costs {} tokens", metadata.cost)?;
    writeln!(out, "Report web url {}/{}", REPORT_WEB_URL, metadata.uuid)?;
    writeln!(out, "\n{}", SECTION)
}

/// Effective config and budgets as JSON.
pub fn write_footer(
    out: &mut impl Write,
    config: &ReportConfig,
    budgets: Option<&PerformanceBudgets>,
) -> io::Result<()> {
    match serde_json::to_string(config) {
        Ok(json) => writeln!(out, "\n{}\n\nConfig:\n{}", SECTION, json)?,
        Err(_) => writeln!(out, "\n{}\n\nConfig:\n{:?}", SECTION, config)?,
    }

    if let Some(budgets) = budgets {
        match serde_json::to_string(&budgets.budgets) {
            Ok(json) => writeln!(out, "\nPerformance Budgets:\n{}\n\n{}", json, SECTION)?,
            Err(_) => writeln!(
                out,
                "\nPerformance Budgets:\n{:?}\n\n{}",
                budgets.budgets, SECTION
            )?,
        }
    }
    Ok(())
}

/// Closing line colored by the worst severity of the run.
pub fn write_verdict(
    out: &mut impl Write,
    summary: &RunSummary,
    palette: &Palette,
) -> io::Result<()> {
    writeln!(
        out,
        "{}",
        summary.verdict().color(palette.color(Some(summary.highest)))
    )?;
    writeln!(
        out,
        "{} rows, {} metrics in warning, {} out of budget",
        summary.rows.to_string().bold(),
        summary.warnings.to_string().yellow(),
        summary.errors.to_string().red()
    )
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
