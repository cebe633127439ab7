//! Batch extractor for JSON objects in a public storage bucket.
//!
//! Each configured file is fetched from `bucket_url + file` with its own
//! retry sequence. Files are fetched concurrently, bounded by
//! `max_concurrency`, and merged in the order they were configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ExtractionError;
use crate::record::RecordSet;
use crate::registry::{ExtractContext, Extractor, Plugin, RetryingExtractor};
use crate::retry::{fan_out, Attempted, RetryPolicy};
use crate::source::remote::{remote_error, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::source::{FetchError, HttpSource};

pub const MODULE: &str = "etlflow::plugins::gcs";
pub const ENTRY_POINT: &str = "GcsDataExtractor";

/// Parameters of [`GcsDataExtractor`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GcsSettings {
    /// Base URL; file paths are appended verbatim.
    pub bucket_url: String,
    /// Object paths fetched by `extract`.
    pub files: Vec<String>,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    /// Worker bound for `extract`; the pipeline's `max_concurrency` when absent.
    pub max_concurrency: Option<usize>,
    pub request_timeout_secs: u64,
}

impl Default for GcsSettings {
    fn default() -> Self {
        Self {
            bucket_url: String::new(),
            files: Vec::new(),
            max_retries: 3,
            retry_delay_secs: 1.0,
            max_concurrency: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Extracts JSON records from bucket objects.
#[derive(Debug, Clone)]
pub struct GcsDataExtractor {
    settings: GcsSettings,
    policy: RetryPolicy,
    source: HttpSource,
}

impl GcsDataExtractor {
    pub fn new(settings: GcsSettings) -> Result<Self, String> {
        if settings.bucket_url.trim().is_empty() {
            return Err("bucket_url is required".to_string());
        }
        if settings.max_concurrency == Some(0) {
            return Err("max_concurrency must be greater than 0".to_string());
        }

        let policy = super::fixed_delay_policy(settings.max_retries, settings.retry_delay_secs)?;
        let source = HttpSource::new(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .map_err(|e| e.to_string())?;

        Ok(Self {
            settings,
            policy,
            source,
        })
    }

    pub fn settings(&self) -> &GcsSettings {
        &self.settings
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn url_for(&self, file: &str) -> String {
        format!("{}{}", self.settings.bucket_url, file)
    }

    /// One attempt at one file. An object without records is malformed.
    async fn fetch_file(&self, file: &str) -> Result<RecordSet, FetchError> {
        let url = self.url_for(file);
        let body = self.source.fetch_json(&url, &[]).await?;
        let records =
            RecordSet::from_json(body, &url).map_err(|e| FetchError::MalformedBody(e.to_string()))?;
        if records.is_empty() {
            return Err(FetchError::MalformedBody(format!("no records in '{}'", url)));
        }
        Ok(records)
    }
}

#[async_trait]
impl RetryingExtractor for GcsDataExtractor {
    async fn extract_with_retry(&self, item: &str) -> Result<Attempted<RecordSet>, ExtractionError> {
        let fetched = self
            .policy
            .execute(|_| self.fetch_file(item))
            .await
            .map_err(|e| remote_error(&self.url_for(item), e))?;

        info!(
            file = item,
            records = fetched.value.len(),
            attempts = fetched.attempts,
            "Extracted bucket object"
        );
        Ok(fetched)
    }
}

#[async_trait]
impl Extractor for GcsDataExtractor {
    async fn extract(&self, ctx: &ExtractContext<'_>) -> Result<RecordSet, ExtractionError> {
        if self.settings.files.is_empty() {
            return Err(ExtractionError::Plugin(
                "gcs extractor has no files configured".to_string(),
            ));
        }

        let concurrency = self
            .settings
            .max_concurrency
            .unwrap_or(ctx.config.max_concurrency);

        let outcome = fan_out(
            self.settings.files.clone(),
            concurrency,
            &self.policy,
            &ctx.cancel,
            |file| async move { self.fetch_file(&file).await },
        )
        .await
        .into_result()?;

        if !outcome.is_complete() {
            warn!(
                succeeded = outcome.successes.len(),
                failed = outcome.failures.len(),
                cancelled = outcome.cancelled.len(),
                "Bucket extraction partially failed"
            );
        }

        let mut records = RecordSet::new();
        for success in outcome.successes {
            records.extend(success.value);
        }

        info!(
            bucket = %self.settings.bucket_url,
            files = self.settings.files.len(),
            records = records.len(),
            "Bucket extraction complete"
        );
        Ok(records)
    }
}

impl Plugin for GcsDataExtractor {
    fn name(&self) -> &str {
        ENTRY_POINT
    }

    fn as_extractor(&self) -> Option<&dyn Extractor> {
        Some(self)
    }

    fn as_retrying_extractor(&self) -> Option<&dyn RetryingExtractor> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::parse_parameters;
    use crate::registry::Capability;
    use serde_json::json;

    #[test]
    fn test_settings_defaults() {
        let settings: GcsSettings =
            parse_parameters(json!({"bucket_url": "https://b/"}).as_object().unwrap()).unwrap();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_delay_secs, 1.0);
        assert!(settings.files.is_empty());
    }

    #[test]
    fn test_requires_bucket_url() {
        assert!(GcsDataExtractor::new(GcsSettings::default()).is_err());
    }

    #[test]
    fn test_capabilities() {
        let plugin = GcsDataExtractor::new(GcsSettings {
            bucket_url: "https://storage.example/bucket/".to_string(),
            ..GcsSettings::default()
        })
        .unwrap();
        assert_eq!(
            plugin.capabilities(),
            vec![Capability::Extract, Capability::ExtractWithRetry]
        );
        assert_eq!(
            plugin.url_for("events/1.json"),
            "https://storage.example/bucket/events/1.json"
        );
        assert_eq!(plugin.policy().backoff_multiplier, 1.0);
    }
}
