use thiserror::Error;

/// Errors talking to the VitalFrog API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not {method} {url}: {source}")]
    Transport {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid status code from {url}: got {status}, expected a 2xx. Body {body:?}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("could not encode request for {url}: {source}")]
    Encode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not decode {what}: {source}. Payload {snippet:?}")]
    Decode {
        what: &'static str,
        snippet: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not read response stream from {url}: {source}")]
    Stream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("report stream ended before its metadata line")]
    MissingMetadata,
}

impl ApiError {
    pub(crate) fn decode(what: &'static str, payload: &[u8], source: serde_json::Error) -> Self {
        ApiError::Decode {
            what,
            snippet: snippet(payload),
            source,
        }
    }
}

/// Invalid CLI configuration, reported before anything is submitted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("both BASIC_AUTH_PASSWORD and BASIC_AUTH_USERNAME must be configured if one of them is set")]
    PartialBasicAuth,

    #[error("at least 1 TARGET_PATH must be set")]
    NoTargetPaths,

    #[error("env var TARGET_HOST must be set")]
    NoTargetHost,

    #[error("either ALLOWED_COUNTRIES or BLOCKED_COUNTRIES can be set, not both")]
    ConflictingCountries,

    #[error("API_BASE_URL must not have '/' suffix")]
    TrailingSlash,

    #[error("invalid EXTRA_HEADERS entry {0:?}, expected Name=Value")]
    InvalidHeader(String),
}

/// Errors ending a consume run.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("could not fetch report rows: {0}")]
    Api(#[from] ApiError),

    #[error("could not render row: {0}")]
    Render(#[from] std::io::Error),

    #[error("report consumption cancelled")]
    Cancelled,

    #[error("stream decode worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

const SNIPPET_LEN: usize = 200;

fn snippet(payload: &[u8]) -> String {
    let payload = String::from_utf8_lossy(payload);
    if payload.chars().count() <= SNIPPET_LEN {
        payload.to_string()
    } else {
        let truncated: String = payload.chars().take(SNIPPET_LEN).collect();
        format!("{}...", truncated)
    }
}
