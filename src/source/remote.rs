//! Remote JSON-over-HTTP reader.

use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;

use crate::error::ExtractionError;
use crate::record::RecordSet;
use crate::retry::{Attempted, Classify, FailureKind, RetryError, RetryPolicy};

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Failure of a single HTTP fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),
}

impl Classify for FetchError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            FetchError::InvalidUrl { .. } => FailureKind::ClientError,
            FetchError::Timeout(_) => FailureKind::Timeout,
            FetchError::Connection(_) => FailureKind::Connection,
            FetchError::Status { status, .. } => {
                if *status == 429 {
                    FailureKind::RateLimited
                } else if *status >= 500 {
                    FailureKind::ServerError
                } else {
                    FailureKind::ClientError
                }
            }
            FetchError::MalformedBody(_) => FailureKind::MalformedResponse,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_decode() {
            FetchError::MalformedBody(e.to_string())
        } else {
            FetchError::Connection(e.to_string())
        }
    }
}

/// Converts the last error of a remote retry sequence into an extraction error.
pub fn remote_error(url: &str, err: RetryError<FetchError>) -> ExtractionError {
    ExtractionError::Remote {
        url: url.to_string(),
        kind: err.kind,
        attempts: err.attempts,
        message: err.error.to_string(),
    }
}

/// HTTP client returning JSON documents.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    /// Creates a source whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Remote {
                url: String::new(),
                kind: FailureKind::ClientError,
                attempts: 0,
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// Creates a source with the default timeout.
    pub fn with_default_timeout() -> Result<Self, ExtractionError> {
        Self::new(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Issues one GET request and parses the body as JSON (no retry).
    pub async fn fetch_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, FetchError> {
        let parsed = if params.is_empty() {
            Url::parse(url)
        } else {
            Url::parse_with_params(url, params.iter().map(|(k, v)| (*k, v.as_str())))
        }
        .map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::MalformedBody(e.to_string()))
    }

    /// Fetches `url` and converts the body into records, retrying per `policy`.
    ///
    /// A `{"data": [...]}` envelope is unwrapped. Bodies that are not objects
    /// or arrays of objects are malformed and never retried.
    pub async fn fetch_records(
        &self,
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<Attempted<RecordSet>, RetryError<FetchError>> {
        policy
            .execute(|attempt| async move {
                tracing::debug!(url = url, attempt = attempt, "Fetching remote records");
                let body = self.fetch_json(url, &[]).await?;
                RecordSet::from_json(body, url).map_err(|e| FetchError::MalformedBody(e.to_string()))
            })
            .await
    }

    /// Built-in remote extraction: one GET with retry, errors mapped to [`ExtractionError`].
    pub async fn read_remote(
        &self,
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<RecordSet, ExtractionError> {
        let fetched = self
            .fetch_records(url, policy)
            .await
            .map_err(|e| remote_error(url, e))?;

        tracing::info!(
            url = url,
            records = fetched.value.len(),
            attempts = fetched.attempts,
            "Remote extraction complete"
        );

        Ok(fetched.value)
    }
}
