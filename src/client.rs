//! HTTP client for the VitalFrog API.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::consumer::ReportSource;
use crate::error::ApiError;
use crate::models::{CreateReportBody, PerformanceBudgets, Report, ReportConfig, ReportMetadata};
use crate::ndjson::{open_report_stream, ReportStream};

pub const DEFAULT_API_BASE_URL: &str = "https://api.vitalfrog.com/v2";

/// Whether `POST /reports` blocks until results are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    Sync,
    Async,
}

/// Authenticated client for one API base URL.
#[derive(Debug, Clone)]
pub struct VitalFrogClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl VitalFrogClient {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, api_token)
    }

    /// Use a preconfigured `reqwest` client, e.g. one with proxy or timeout
    /// settings.
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_token: api_token.into(),
        }
    }

    /// GET the performance budget set with the given id.
    pub async fn get_performance_budgets(&self, id: i32) -> Result<PerformanceBudgets, ApiError> {
        self.get_json(&format!("/performance_budgets/{}", id), "performance budgets")
            .await
    }

    /// Start a report. Returns only its metadata; rows are fetched separately.
    pub async fn create_report(
        &self,
        config: &ReportConfig,
        mode: SubmitMode,
    ) -> Result<ReportMetadata, ApiError> {
        let body = CreateReportBody {
            run_async: mode == SubmitMode::Async,
            jsonl: false,
            config,
        };
        let (url, resp) = self.post("/reports", &body).await?;
        let metadata: ReportMetadata = read_json(&url, resp, "report metadata").await?;
        info!(uuid = %metadata.uuid, cost = metadata.cost, ?mode, "report created");
        Ok(metadata)
    }

    /// Start a synchronous report whose rows are streamed back as NDJSON on
    /// the same response. The metadata line is read before returning.
    pub async fn create_streamed_report(
        &self,
        config: &ReportConfig,
    ) -> Result<ReportStream, ApiError> {
        let body = CreateReportBody {
            run_async: false,
            jsonl: true,
            config,
        };
        let (url, resp) = self.post("/reports", &body).await?;
        let stream_url = url.clone();
        let bytes = resp
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|source| ApiError::Stream {
                    url: stream_url.clone(),
                    source,
                })
            })
            .boxed();
        let stream = open_report_stream(bytes).await?;
        info!(uuid = %stream.metadata.uuid, cost = stream.metadata.cost, "streamed report created");
        Ok(stream)
    }

    /// GET the current rows and metadata of a report.
    pub async fn get_report(&self, uuid: &str) -> Result<Report, ApiError> {
        self.get_json(&format!("/reports/{}", uuid), "report").await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        what: &'static str,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                method: "GET",
                url: url.clone(),
                source,
            })?;
        let resp = check_status(&url, resp).await?;
        read_json(&url, resp, what).await
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(String, reqwest::Response), ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_vec(body).map_err(|source| ApiError::Encode {
            url: url.clone(),
            source,
        })?;
        debug!(%url, bytes = payload.len(), "POST");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                method: "POST",
                url: url.clone(),
                source,
            })?;
        let resp = check_status(&url, resp).await?;
        Ok((url, resp))
    }
}

#[async_trait]
impl ReportSource for VitalFrogClient {
    async fn fetch_report(&self, uuid: &str) -> Result<Report, ApiError> {
        self.get_report(uuid).await
    }
}

async fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => format!("<unreadable body: {}>", e),
    };
    Err(ApiError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(
    url: &str,
    resp: reqwest::Response,
    what: &'static str,
) -> Result<T, ApiError> {
    let body = resp.bytes().await.map_err(|source| ApiError::Stream {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|source| ApiError::decode(what, &body, source))
}
