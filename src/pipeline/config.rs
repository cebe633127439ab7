//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is read from a JSON or YAML document (unknown fields
//! are ignored) or assembled with the builder methods. Required fields are
//! `data_source` and `data_source_path`; everything else has a default.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigurationError;
use crate::record::ValueType;
use crate::registry::PluginDescriptor;
use crate::retry::RetryPolicy;
use crate::source::remote::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Default number of concurrent fetches during batch fan-out.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Where records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Files in a local directory.
    Local,
    /// A single HTTP endpoint returning JSON.
    Remote,
}

impl FromStr for DataSource {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(DataSource::Local),
            "remote" => Ok(DataSource::Remote),
            other => Err(ConfigurationError::InvalidValue {
                field: "data_source".to_string(),
                message: format!("expected 'local' or 'remote', got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Local => write!(f, "local"),
            DataSource::Remote => write!(f, "remote"),
        }
    }
}

/// Input file format for local sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Json,
    Parquet,
}

impl DataFormat {
    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Parquet => "parquet",
        }
    }

    /// Returns true if `path` has this format's extension.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(self.extension()))
            .unwrap_or(false)
    }
}

impl FromStr for DataFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(DataFormat::Json),
            "parquet" => Ok(DataFormat::Parquet),
            other => Err(ConfigurationError::InvalidValue {
                field: "data_format".to_string(),
                message: format!("expected 'json' or 'parquet', got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Plugin names bound to each stage. Unbound stages use built-in behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageBindings {
    pub extract: Option<String>,
    pub transform: Option<String>,
    pub load: Option<String>,
}

/// Built-in transform applied when no transform plugin is bound.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformSpec {
    /// Records pass through unchanged.
    #[default]
    Identity,
    /// Numeric fields are multiplied by `factor`.
    Scale {
        factor: f64,
        /// Restrict scaling to these top-level fields; all numeric fields when absent.
        #[serde(default)]
        fields: Option<Vec<String>>,
    },
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub data_source: DataSource,
    /// Directory for local sources, URL for remote sources.
    pub data_source_path: String,
    pub data_format: DataFormat,
    pub plugins: BTreeMap<String, PluginDescriptor>,
    pub stages: StageBindings,
    pub transform: TransformSpec,
    /// Policy wrapping remote fetches.
    pub retry: RetryPolicy,
    /// Worker bound for batch fan-out.
    pub max_concurrency: usize,
    #[serde(rename = "request_timeout_secs", serialize_with = "serialize_secs")]
    pub request_timeout: Duration,
    /// Fields the quality scorer checks for completeness; all observed fields when absent.
    pub required_fields: Option<Vec<String>>,
    /// Declared column types (`id: int64`, `name: string`) checked by the
    /// quality scorer.
    pub expected_types: Option<BTreeMap<String, ValueType>>,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

/// Deserialisation shape: every field optional so missing required fields
/// surface as [`ConfigurationError::MissingField`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPipelineConfig {
    data_source: Option<String>,
    data_source_path: Option<String>,
    data_format: Option<String>,
    plugins: BTreeMap<String, PluginDescriptor>,
    stages: StageBindings,
    transform: TransformSpec,
    retry: Option<RetryPolicy>,
    max_concurrency: Option<usize>,
    request_timeout_secs: Option<u64>,
    required_fields: Option<Vec<String>>,
    expected_types: Option<BTreeMap<String, ValueType>>,
}

impl PipelineConfig {
    /// Creates a configuration with default settings for the given source.
    pub fn new(data_source: DataSource, data_source_path: impl Into<String>) -> Self {
        Self {
            data_source,
            data_source_path: data_source_path.into(),
            data_format: DataFormat::default(),
            plugins: BTreeMap::new(),
            stages: StageBindings::default(),
            transform: TransformSpec::default(),
            retry: RetryPolicy::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            required_fields: None,
            expected_types: None,
        }
    }

    /// Configuration reading a local directory.
    pub fn local(dir: impl Into<String>) -> Self {
        Self::new(DataSource::Local, dir)
    }

    /// Configuration reading a remote endpoint.
    pub fn remote(url: impl Into<String>) -> Self {
        Self::new(DataSource::Remote, url)
    }

    /// Parses and validates a configuration from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConfigurationError> {
        let raw: RawPipelineConfig = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigurationError> {
        let raw: RawPipelineConfig = serde_json::from_str(s)?;
        Self::from_raw(raw)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigurationError> {
        let raw: RawPipelineConfig = serde_yaml::from_str(s)?;
        Self::from_raw(raw)
    }

    /// Reads a `.json`, `.yaml` or `.yml` configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => Self::from_json_str(&contents),
            "yaml" | "yml" => Self::from_yaml_str(&contents),
            other => Err(ConfigurationError::UnsupportedFile(other.to_string())),
        }
    }

    fn from_raw(raw: RawPipelineConfig) -> Result<Self, ConfigurationError> {
        let data_source: DataSource = raw
            .data_source
            .ok_or(ConfigurationError::MissingField("data_source"))?
            .parse()?;
        let data_source_path = raw
            .data_source_path
            .ok_or(ConfigurationError::MissingField("data_source_path"))?;

        let mut config = Self::new(data_source, data_source_path);
        if let Some(format) = raw.data_format {
            config.data_format = format.parse()?;
        }
        config.plugins = raw.plugins;
        config.stages = raw.stages;
        config.transform = raw.transform;
        if let Some(retry) = raw.retry {
            config.retry = retry;
        }
        if let Some(max) = raw.max_concurrency {
            config.max_concurrency = max;
        }
        if let Some(secs) = raw.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.required_fields = raw.required_fields;
        config.expected_types = raw.expected_types;

        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides.
    ///
    /// # Environment Variables
    ///
    /// - `ETLFLOW_MAX_CONCURRENCY`: batch fan-out worker count
    /// - `ETLFLOW_REQUEST_TIMEOUT_SECS`: HTTP request timeout in seconds
    /// - `ETLFLOW_RETRY_MAX_ATTEMPTS`: maximum attempts per remote fetch
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigurationError> {
        if let Ok(val) = std::env::var("ETLFLOW_MAX_CONCURRENCY") {
            self.max_concurrency = parse_env_value(&val, "ETLFLOW_MAX_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("ETLFLOW_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "ETLFLOW_REQUEST_TIMEOUT_SECS")?;
            self.request_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("ETLFLOW_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env_value(&val, "ETLFLOW_RETRY_MAX_ATTEMPTS")?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.data_source_path.trim().is_empty() {
            return Err(ConfigurationError::MissingField("data_source_path"));
        }

        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "must be greater than 0"));
        }

        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout_secs", "must be greater than 0"));
        }

        self.retry
            .validate()
            .map_err(|message| invalid("retry", &message))?;

        if let TransformSpec::Scale { factor, .. } = &self.transform {
            if !factor.is_finite() {
                return Err(invalid("transform.factor", "must be a finite number"));
            }
        }

        for (name, descriptor) in &self.plugins {
            if descriptor.target.module.trim().is_empty()
                || descriptor.target.entry_point.trim().is_empty()
            {
                return Err(invalid(
                    &format!("plugins.{}", name),
                    "module and class must be non-empty",
                ));
            }
        }

        Ok(())
    }

    /// Sets the input format.
    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    /// Adds or replaces a plugin descriptor.
    pub fn with_plugin(mut self, name: impl Into<String>, descriptor: PluginDescriptor) -> Self {
        self.plugins.insert(name.into(), descriptor);
        self
    }

    /// Binds a plugin to the extract stage.
    pub fn with_extract_plugin(mut self, name: impl Into<String>) -> Self {
        self.stages.extract = Some(name.into());
        self
    }

    /// Binds a plugin to the transform stage.
    pub fn with_transform_plugin(mut self, name: impl Into<String>) -> Self {
        self.stages.transform = Some(name.into());
        self
    }

    /// Binds a plugin to the load stage.
    pub fn with_load_plugin(mut self, name: impl Into<String>) -> Self {
        self.stages.load = Some(name.into());
        self
    }

    /// Sets the built-in transform.
    pub fn with_transform(mut self, transform: TransformSpec) -> Self {
        self.transform = transform;
        self
    }

    /// Sets the retry policy for remote fetches.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the fan-out worker bound.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Sets the HTTP request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the fields checked for completeness.
    pub fn with_required_fields(mut self, fields: Vec<String>) -> Self {
        self.required_fields = Some(fields);
        self
    }

    /// Declares column types for the quality schema check.
    pub fn with_expected_types(mut self, types: BTreeMap<String, ValueType>) -> Self {
        self.expected_types = Some(types);
        self
    }
}

fn invalid(field: &str, message: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: key.to_string(),
        message: format!("cannot parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_config() {
        let config = PipelineConfig::from_value(json!({
            "data_source": "local",
            "data_source_path": "./fixtures"
        }))
        .unwrap();
        assert_eq!(config.data_source, DataSource::Local);
        assert_eq!(config.data_format, DataFormat::Json);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.transform, TransformSpec::Identity);
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config = PipelineConfig::from_value(json!({
            "data_source": "remote",
            "data_source_path": "https://example.com/data.json",
            "data_format": "json",
            "dashboard_theme": "dark"
        }))
        .unwrap();
        assert_eq!(config.data_source, DataSource::Remote);
    }

    #[test]
    fn test_missing_required_fields() {
        let err = PipelineConfig::from_value(json!({"data_source_path": "x"})).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingField("data_source")));

        let err = PipelineConfig::from_value(json!({"data_source": "local"})).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingField("data_source_path")
        ));
    }

    #[test]
    fn test_invalid_values() {
        let err = PipelineConfig::from_value(json!({
            "data_source": "ftp",
            "data_source_path": "x"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("data_source"));

        let err = PipelineConfig::from_value(json!({
            "data_source": "local",
            "data_source_path": "x",
            "data_format": "xml"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("data_format"));

        let err = PipelineConfig::from_value(json!({
            "data_source": "local",
            "data_source_path": "x",
            "max_concurrency": 0
        }))
        .unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_full_config_with_plugins() {
        let config = PipelineConfig::from_value(json!({
            "data_source": "remote",
            "data_source_path": "https://storage.example.com/bucket/",
            "plugins": {
                "gcs": {
                    "module": "etlflow::plugins::gcs",
                    "class": "GcsDataExtractor",
                    "enabled": true,
                    "bucket_url": "https://storage.example.com/bucket/",
                    "files": ["a.json", "b.json"]
                }
            },
            "stages": {"extract": "gcs"},
            "transform": {"kind": "scale", "factor": 2.0},
            "retry": {"max_attempts": 4, "base_delay_ms": 10}
        }))
        .unwrap();

        let gcs = &config.plugins["gcs"];
        assert!(gcs.enabled);
        assert_eq!(gcs.target.entry_point, "GcsDataExtractor");
        assert_eq!(gcs.parameters["files"], json!(["a.json", "b.json"]));
        assert_eq!(config.stages.extract.as_deref(), Some("gcs"));
        assert_eq!(config.retry.max_attempts, 4);
        assert!(matches!(config.transform, TransformSpec::Scale { factor, .. } if factor == 2.0));
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
data_source: local
data_source_path: ./data
data_format: parquet
plugins:
  odds:
    module: etlflow::plugins::sports
    class: SportsOddsTransformer
    enabled: false
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.data_format, DataFormat::Parquet);
        assert!(!config.plugins["odds"].enabled);
        assert!(config.expected_types.is_none());
    }

    #[test]
    fn test_expected_types() {
        let yaml = r#"
data_source: local
data_source_path: ./data
expected_types:
  id: int64
  name: string
  active: bool
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        let types = config.expected_types.unwrap();
        assert_eq!(types["id"], ValueType::Number);
        assert_eq!(types["name"], ValueType::String);
        assert_eq!(types["active"], ValueType::Bool);

        let bad = r#"
data_source: local
data_source_path: ./data
expected_types:
  id: decimal128
"#;
        assert!(PipelineConfig::from_yaml_str(bad).is_err());
    }

    #[test]
    fn test_from_file_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"data_source": "local", "data_source_path": "./data"}"#,
        )
        .unwrap();
        assert!(PipelineConfig::from_file(&path).is_ok());

        let bad = dir.path().join("pipeline.toml");
        std::fs::write(&bad, "").unwrap();
        assert!(matches!(
            PipelineConfig::from_file(&bad),
            Err(ConfigurationError::UnsupportedFile(_))
        ));
    }

    #[test]
    fn test_data_format_matches() {
        assert!(DataFormat::Json.matches(Path::new("a/b/events.JSON")));
        assert!(!DataFormat::Json.matches(Path::new("a/b/events.parquet")));
        assert!(DataFormat::Parquet.matches(Path::new("x.parquet")));
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::local("./data")
            .with_format(DataFormat::Parquet)
            .with_max_concurrency(8)
            .with_transform_plugin("odds");
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.stages.transform.as_deref(), Some("odds"));
    }
}
