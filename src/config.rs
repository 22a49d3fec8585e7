use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::client::{SubmitMode, DEFAULT_API_BASE_URL};
use crate::error::ConfigError;
use crate::models::{
    BasicAuth, Countries, Country, CountryMode, Device, DeviceName, Header, HttpConfig,
    PathSelection, ReportConfig, Target,
};

/// Run a VitalFrog performance report and check it against your budgets.
///
/// Every option can also be set through the environment variable shown.
#[derive(Parser, Debug, Clone)]
#[command(name = "vitalfrog", version)]
pub struct Config {
    /// API address of the VitalFrog api
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Your VitalFrog api token
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    /// Which countries to test from. Either this or blocked countries, not both
    #[arg(long, env = "ALLOWED_COUNTRIES", value_delimiter = ',')]
    pub allowed_countries: Vec<String>,

    /// Which countries NOT to test from. Either this or allowed countries, not both
    #[arg(long, env = "BLOCKED_COUNTRIES", value_delimiter = ',')]
    pub blocked_countries: Vec<String>,

    /// Performance budgets to use. Falls back to the VitalFrog default
    #[arg(long, env = "PERFORMANCE_BUDGETS_ID")]
    pub performance_budgets_id: Option<i32>,

    /// Devices to test on. Falls back to desktop and mobile
    #[arg(long, env = "DEVICES", value_enum, value_delimiter = ',')]
    pub devices: Vec<DeviceName>,

    /// Host of the url you want to test
    #[arg(long, env = "TARGET_HOST")]
    pub target_host: String,

    /// Scheme to use on the target host
    #[arg(long = "target-schema", env = "TARGET_SCHEMA", value_enum, default_value_t = Scheme::Https)]
    pub target_scheme: Scheme,

    /// Paths to test
    #[arg(long, env = "TARGET_PATHS", value_delimiter = ',', required = true)]
    pub target_paths: Vec<String>,

    /// Version of the code under test, for later tracing
    #[arg(long = "component-version", env = "VERSION")]
    pub component_version: Option<String>,

    /// Name of the component under test, helps with cross repo problems
    #[arg(long, env = "COMPONENT_NAME")]
    pub component_name: Option<String>,

    /// Basic auth username. Requires the password as well
    #[arg(long, env = "BASIC_AUTH_USERNAME")]
    pub basic_auth_username: Option<String>,

    /// Basic auth password. Requires the username as well
    #[arg(long, env = "BASIC_AUTH_PASSWORD", hide_env_values = true)]
    pub basic_auth_password: Option<String>,

    /// Additional request headers as Name=Value, separated by ';'
    #[arg(long, env = "EXTRA_HEADERS", value_delimiter = ';')]
    pub extra_headers: Vec<String>,

    /// Submit without waiting for results; check the report in the browser
    #[arg(long, env = "RUN_ASYNC")]
    pub run_async: bool,

    /// Stream rows on the submission response instead of polling
    #[arg(long, env = "STREAM_RESULTS")]
    pub stream_results: bool,

    /// Give up waiting for results after this many seconds
    #[arg(long, env = "REPORT_TIMEOUT_SECS")]
    pub report_timeout_secs: Option<u64>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scheme {
    Https,
    Http,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Info,
    Debug,
}

impl LogLevel {
    /// Default `tracing` filter directive for this level.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "vitalfrog=error",
            LogLevel::Info => "vitalfrog=info",
            LogLevel::Debug => "vitalfrog=debug",
        }
    }
}

impl Config {
    /// Reject option combinations the service would refuse or misread.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.basic_auth_username.is_some() != self.basic_auth_password.is_some() {
            return Err(ConfigError::PartialBasicAuth);
        }
        if self.target_paths.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::NoTargetPaths);
        }
        if self.target_host.trim().is_empty() {
            return Err(ConfigError::NoTargetHost);
        }
        if !self.allowed_countries.is_empty() && !self.blocked_countries.is_empty() {
            return Err(ConfigError::ConflictingCountries);
        }
        if self.api_base_url.ends_with('/') {
            return Err(ConfigError::TrailingSlash);
        }
        self.parse_headers()?;
        Ok(())
    }

    pub fn submit_mode(&self) -> SubmitMode {
        if self.run_async {
            SubmitMode::Async
        } else {
            SubmitMode::Sync
        }
    }

    pub fn report_timeout(&self) -> Option<Duration> {
        self.report_timeout_secs.map(Duration::from_secs)
    }

    /// Build the wire config for `POST /reports`.
    pub fn to_report_config(&self) -> Result<ReportConfig, ConfigError> {
        let paths = self
            .target_paths
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        let countries = if !self.blocked_countries.is_empty() {
            Some(countries(&self.blocked_countries, CountryMode::BlockList))
        } else if !self.allowed_countries.is_empty() {
            Some(countries(&self.allowed_countries, CountryMode::AllowList))
        } else {
            None
        };

        let devices = if self.devices.is_empty() {
            None
        } else {
            let mut devices: Vec<Device> = Vec::new();
            for name in &self.devices {
                if !devices.iter().any(|d| d.name == *name) {
                    devices.push(Device { name: *name });
                }
            }
            Some(devices)
        };

        let basic_auth = match (&self.basic_auth_username, &self.basic_auth_password) {
            (Some(username), Some(password)) => Some(BasicAuth {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        let headers = self.parse_headers()?;
        let http = if basic_auth.is_some() || !headers.is_empty() {
            Some(HttpConfig {
                basic_auth,
                extra_headers: (!headers.is_empty()).then_some(headers),
            })
        } else {
            None
        };

        Ok(ReportConfig {
            target: Target {
                host: self.target_host.trim().to_string(),
                scheme: Some(self.target_scheme.as_str().to_string()),
                paths: PathSelection::manual(paths),
            },
            countries,
            devices,
            performance_budgets_id: self.performance_budgets_id.filter(|id| *id != 0),
            http,
            component: non_empty(&self.component_name),
            version: non_empty(&self.component_version),
        })
    }

    fn parse_headers(&self) -> Result<Vec<Header>, ConfigError> {
        self.extra_headers
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| {
                let (name, value) = entry
                    .split_once('=')
                    .ok_or_else(|| ConfigError::InvalidHeader(entry.clone()))?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(ConfigError::InvalidHeader(entry.clone()));
                }
                Ok(Header {
                    header: name.to_string(),
                    value: value.trim().to_string(),
                })
            })
            .collect()
    }
}

fn countries(codes: &[String], mode: CountryMode) -> Countries {
    Countries {
        list: codes
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|code| Country {
                code: code.to_uppercase(),
            })
            .collect(),
        mode,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
