//! etlflow: Configuration-driven ETL runner.
//!
//! This library reads records from local files, remote JSON endpoints, or
//! plugin extractors, transforms them, scores their quality, and writes
//! CSV or Parquet output.

// Core modules
pub mod cli;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod plugins;
pub mod quality;
pub mod record;
pub mod registry;
pub mod retry;
pub mod source;

// Re-export commonly used error types
pub use error::{
    ConfigurationError, ErrorKind, ExtractionError, LoadError, PipelineError, PluginLoadError,
    SequencingError, TransformationError,
};

// Re-export the pipeline surface
pub use export::OutputFormat;
pub use pipeline::{
    DataFormat, DataSource, PipelineConfig, PipelineOrchestrator, PipelineState, RunSummary,
    TransformSpec,
};
pub use quality::{QualityReport, QualityScorer};
pub use record::{Record, RecordSet};
pub use registry::{PluginCatalog, PluginDescriptor, PluginRegistry, PluginTarget};
pub use retry::{CancelSignal, RetryPolicy};
