//! Pipeline orchestration for configuration-driven ETL runs.
//!
//! # Architecture
//!
//! - **Config**: [`PipelineConfig`], loaded from JSON/YAML or built in code
//! - **Orchestrator**: [`PipelineOrchestrator`], the configure → extract →
//!   transform → load state machine
//! - **Transform**: [`BuiltinTransform`], used when no transform plugin is bound
//!
//! # Pipeline Flow
//!
//! 1. **Configure**: validate the config and register its plugin descriptors
//! 2. **Extract**: read a local directory, a remote endpoint, or call the bound
//!    extract plugin; score the result for quality
//! 3. **Transform**: map the extracted records to a new set of equal length
//! 4. **Load**: write `{prefix}.csv` or `{prefix}.parquet`, or call the bound
//!    load plugin
//!
//! # Example
//!
//! ```rust,ignore
//! use etlflow::pipeline::{PipelineConfig, PipelineOrchestrator};
//!
//! let config = PipelineConfig::local("./fixtures");
//!
//! let mut orchestrator = PipelineOrchestrator::new();
//! orchestrator.configure(config)?;
//! orchestrator.extract().await?;
//! orchestrator.transform()?;
//! let outputs = orchestrator.load("out/run", "csv").await?;
//!
//! println!("wrote {:?}", outputs);
//! ```
//!
//! # Configuration
//!
//! ```rust,ignore
//! // From a file, then environment overrides
//! let config = PipelineConfig::from_file(Path::new("pipeline.yaml"))?
//!     .apply_env_overrides()?;
//! ```

pub mod config;
pub mod orchestrator;
pub mod transform;

// Re-export main types for convenience
pub use config::{DataFormat, DataSource, PipelineConfig, StageBindings, TransformSpec};
pub use orchestrator::{
    PipelineOrchestrator, PipelineState, RunSummary, Stage, StageFailure, StageStats,
};
pub use transform::{scale_records, BuiltinTransform};
