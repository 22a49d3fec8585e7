//! Wire types for the VitalFrog API.
//!
//! Everything here is plain serde data. Optional request fields are skipped when
//! unset so the service applies its own defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Configuration of a report run, as submitted to `POST /reports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countries: Option<Countries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<Device>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_budgets_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,
    /// Name of the component under test, for cross-repo tracing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Version of the component under test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Host and paths to test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    pub paths: PathSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSelection {
    /// Always `manual` for paths listed by the caller
    pub mode: String,
    pub paths: Vec<String>,
}

impl PathSelection {
    pub fn manual(paths: Vec<String>) -> Self {
        Self {
            mode: "manual".to_string(),
            paths,
        }
    }
}

/// Country filter. Only one mode can be active per report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Countries {
    pub list: Vec<Country>,
    pub mode: CountryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountryMode {
    AllowList,
    BlockList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: DeviceName,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DeviceName {
    Mobile,
    Desktop,
    /// Any device the service reports that this client does not know
    #[default]
    #[serde(other)]
    #[value(skip)]
    Unknown,
}

impl std::fmt::Display for DeviceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceName::Mobile => write!(f, "mobile"),
            DeviceName::Desktop => write!(f, "desktop"),
            DeviceName::Unknown => write!(f, "unknown"),
        }
    }
}

/// HTTP extras the remote browser applies when loading the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<Vec<Header>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub header: String,
    pub value: String,
}

/// Body of `POST /reports`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateReportBody<'a> {
    #[serde(rename = "async")]
    pub run_async: bool,
    pub jsonl: bool,
    pub config: &'a ReportConfig,
}

/// Metadata returned when a report is created, and embedded in every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub uuid: String,
    pub created: DateTime<Utc>,
    /// Tokens charged for this report
    pub cost: i64,
    pub config: ReportConfig,
    /// Set once the service has delivered every row
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
}

/// Envelope of `GET /reports/{uuid}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub data: Vec<PerformanceReport>,
    pub metadata: ReportMetadata,
}

impl Report {
    pub fn is_finished(&self) -> bool {
        self.metadata.finished.is_some()
    }
}

/// One measurement: a path loaded on one device from one country.
///
/// Measurements the service could not take arrive as `null` or not at all and
/// decode as zero, so one incomplete row never ends a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub id: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub device: Device,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country: Country,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_potential_fid_ms: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_response_time_ms: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interactive_ms: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cumulative_layout_shift: CumulativeLayoutShift,
    #[serde(default, deserialize_with = "null_as_default")]
    pub largest_contentful_paint: LargestContentfulPaint,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeLayoutShift {
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: f64,
    /// Elements that shifted, worst first
    #[serde(default)]
    pub elements: Option<Vec<Element>>,
}

impl CumulativeLayoutShift {
    /// Layout shift on the integer scale budgets use: `value * 100`, truncated.
    pub fn scaled(&self) -> i32 {
        (self.value * 100.0) as i32
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LargestContentfulPaint {
    #[serde(default, deserialize_with = "null_as_default")]
    pub value_ms: i32,
    #[serde(default)]
    pub element: Option<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// CSS selector chain, `>` separated
    pub selector: String,
}

/// Budget set of `GET /performance_budgets/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBudgets {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub budgets: Vec<Budget>,
}

/// Warning and error thresholds for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub metric: BudgetMetric,
    pub warning: i32,
    pub error: i32,
    /// Direction of the thresholds, `above` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BudgetMode>,
}

impl Budget {
    pub fn mode(&self) -> BudgetMode {
        self.mode.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    /// Bad when the value grows past the thresholds
    #[default]
    Above,
    /// Bad when the value drops past the thresholds
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMetric {
    LargestContentfulPaintMs,
    MaxPotentialFidMs,
    CumulativeLayoutShift,
    ServerResponseTimeMs,
    InteractiveMs,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn budget_mode_defaults_to_above() {
        let budget: Budget = serde_json::from_value(json!({
            "metric": "server_response_time_ms",
            "warning": 200,
            "error": 500
        }))
        .unwrap();
        assert_eq!(budget.mode, None);
        assert_eq!(budget.mode(), BudgetMode::Above);
    }

    #[test]
    fn unknown_metric_deserializes() {
        let budget: Budget = serde_json::from_value(json!({
            "metric": "total_blocking_time_ms",
            "warning": 1,
            "error": 2,
            "mode": "below"
        }))
        .unwrap();
        assert_eq!(budget.metric, BudgetMetric::Unknown);
        assert_eq!(budget.mode(), BudgetMode::Below);
    }

    #[test]
    fn cls_scale_truncates() {
        let cls = CumulativeLayoutShift {
            value: 0.251,
            elements: None,
        };
        assert_eq!(cls.scaled(), 25);
    }

    #[test]
    fn create_body_uses_async_key_and_skips_unset_fields() {
        let config = ReportConfig {
            target: Target {
                host: "example.com".to_string(),
                scheme: Some("https".to_string()),
                paths: PathSelection::manual(vec!["/".to_string()]),
            },
            countries: None,
            devices: None,
            performance_budgets_id: None,
            http: None,
            component: None,
            version: None,
        };
        let body = CreateReportBody {
            run_async: true,
            jsonl: false,
            config: &config,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["async"], json!(true));
        assert_eq!(value["jsonl"], json!(false));
        assert_eq!(value["config"]["target"]["paths"]["mode"], json!("manual"));
        assert!(value["config"].get("countries").is_none());
    }

    #[test]
    fn row_with_missing_measurements_decodes_as_zero() {
        let row: PerformanceReport = serde_json::from_value(json!({
            "id": 4,
            "path": "/pricing",
            "device": {"name": "desktop"},
            "country": {"code": "NL"},
            "max_potential_fid_ms": null,
            "server_response_time_ms": 180,
            "cumulative_layout_shift": {"value": null, "elements": null},
            "largest_contentful_paint": null
        }))
        .unwrap();
        assert_eq!(row.max_potential_fid_ms, 0);
        assert_eq!(row.server_response_time_ms, 180);
        assert_eq!(row.interactive_ms, 0);
        assert_eq!(row.cumulative_layout_shift.value, 0.0);
        assert_eq!(row.largest_contentful_paint.value_ms, 0);
        assert!(row.largest_contentful_paint.element.is_none());
    }

    #[test]
    fn unknown_device_decodes() {
        let device: Device = serde_json::from_value(json!({"name": "tablet"})).unwrap();
        assert_eq!(device.name, DeviceName::Unknown);
        assert_eq!(device.name.to_string(), "unknown");
    }

    #[test]
    fn unknown_device_is_not_a_cli_value() {
        use clap::ValueEnum;
        assert!(DeviceName::Unknown.to_possible_value().is_none());
        assert!(DeviceName::Mobile.to_possible_value().is_some());
    }

    #[test]
    fn report_envelope_finished_marker() {
        let report: Report = serde_json::from_value(json!({
            "data": [],
            "metadata": {
                "uuid": "abc",
                "created": "2024-01-01T00:00:00Z",
                "cost": 3,
                "config": {"target": {"host": "example.com", "paths": {"mode": "manual", "paths": ["/"]}}},
                "finished": null
            }
        }))
        .unwrap();
        assert!(!report.is_finished());
    }
}
