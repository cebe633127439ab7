//! Error types for etlflow operations.
//!
//! Defines one error enum per pipeline concern:
//! - Configuration parsing and validation
//! - Stage sequencing
//! - Extraction (local files, remote endpoints, plugins)
//! - Transformation
//! - Loading (CSV / Parquet output)
//! - Plugin resolution
//!
//! [`PipelineError`] unifies them so the orchestrator can surface the
//! originating stage and error kind to callers.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::FailureKind;

/// Errors raised while reading or validating pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unsupported configuration file extension: {0}")]
    UnsupportedFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A stage was invoked while the orchestrator was not in its required predecessor state.
#[derive(Debug, Error)]
#[error("Cannot run '{stage}' while pipeline is {state}; expected {expected}")]
pub struct SequencingError {
    pub stage: String,
    pub state: String,
    pub expected: String,
}

/// Errors that can occur during extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Data source directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed data in '{origin}': {reason}")]
    Malformed { origin: String, reason: String },

    #[error("Request to '{url}' failed after {attempts} attempt(s): {message}")]
    Remote {
        url: String,
        kind: FailureKind,
        attempts: u32,
        message: String,
    },

    #[error("Parquet error in '{path}': {message}")]
    Parquet { path: PathBuf, message: String },

    #[error("Batch extraction failed: {succeeded} of {total} item(s) succeeded; {message}")]
    Batch {
        succeeded: usize,
        total: usize,
        message: String,
    },

    #[error("Plugin extraction failed: {0}")]
    Plugin(String),
}

/// Errors that can occur while transforming a record set.
#[derive(Debug, Error)]
pub enum TransformationError {
    #[error("Transform changed record count from {expected} to {actual}")]
    RecordCountMismatch { expected: usize, actual: usize },

    #[error("Unhandled value for field '{field}' in record {index}: {reason}")]
    UnhandledValue {
        index: usize,
        field: String,
        reason: String,
    },

    #[error("Invalid transform configuration: {0}")]
    InvalidConfig(String),
}

/// Errors that can occur while writing output files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Unsupported output format '{0}': expected 'csv' or 'parquet'")]
    UnsupportedFormat(String),

    #[error("Failed to write '{path}': {message}")]
    WriteFailed { path: PathBuf, message: String },

    #[error("Cannot write {0} record(s) without fields: the output would have no header")]
    NoFields(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Plugin load failed: {0}")]
    Plugin(String),
}

/// Errors raised by the plugin registry.
#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("Plugin '{0}' is not registered")]
    Unknown(String),

    #[error("Plugin '{0}' is disabled")]
    Disabled(String),

    #[error("Plugin '{name}' target '{target}' cannot be resolved")]
    UnresolvableTarget { name: String, target: String },

    #[error("Plugin '{name}' failed to initialise: {reason}")]
    InstantiationFailed { name: String, reason: String },

    #[error("Plugin '{name}' does not provide the '{capability}' capability")]
    MissingCapability {
        name: String,
        capability: &'static str,
    },
}

/// Coarse classification of pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Sequencing,
    Extraction,
    Transformation,
    Load,
    PluginLoad,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration_error"),
            ErrorKind::Sequencing => write!(f, "sequencing_error"),
            ErrorKind::Extraction => write!(f, "extraction_error"),
            ErrorKind::Transformation => write!(f, "transformation_error"),
            ErrorKind::Load => write!(f, "load_error"),
            ErrorKind::PluginLoad => write!(f, "plugin_load_error"),
        }
    }
}

/// Top-level error returned by the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Sequencing error: {0}")]
    Sequencing(#[from] SequencingError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Transformation error: {0}")]
    Transformation(#[from] TransformationError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Plugin load error: {0}")]
    PluginLoad(#[from] PluginLoadError),
}

impl PipelineError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Configuration(_) => ErrorKind::Configuration,
            PipelineError::Sequencing(_) => ErrorKind::Sequencing,
            PipelineError::Extraction(_) => ErrorKind::Extraction,
            PipelineError::Transformation(_) => ErrorKind::Transformation,
            PipelineError::Load(_) => ErrorKind::Load,
            PipelineError::PluginLoad(_) => ErrorKind::PluginLoad,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err = PipelineError::from(ConfigurationError::MissingField("data_source"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("data_source"));

        let err = PipelineError::from(PluginLoadError::Disabled("gcs".to_string()));
        assert_eq!(err.kind(), ErrorKind::PluginLoad);
        assert!(err.to_string().contains("disabled"));

        let err = PipelineError::from(TransformationError::RecordCountMismatch {
            expected: 8,
            actual: 7,
        });
        assert_eq!(err.kind(), ErrorKind::Transformation);
        assert!(err.to_string().contains("from 8 to 7"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Sequencing.to_string(), "sequencing_error");
        assert_eq!(ErrorKind::PluginLoad.to_string(), "plugin_load_error");
    }
}
