//! Pipeline orchestrator.
//!
//! This module provides the `PipelineOrchestrator`, a state machine that
//! sequences configure → extract → transform → load:
//! - each stage requires the state left by the previous one
//! - a stage delegates to a registry plugin when one is bound, otherwise to
//!   the built-in reader, transform, or writer
//! - any stage failure moves the pipeline to `Failed` and records the stage
//!   and error kind
//!
//! `configure()` may be called from any state and always resets the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError, PluginLoadError, SequencingError};
use crate::export::{self, OutputFormat};
use crate::quality::{QualityReport, QualityScorer};
use crate::record::RecordSet;
use crate::registry::{Capability, ExtractContext, PluginCatalog, PluginRegistry, Transformer};
use crate::retry::CancelSignal;
use crate::source::{read_local, HttpSource};

use super::config::{DataSource, PipelineConfig};
use super::transform::BuiltinTransform;

/// Lifecycle state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Unconfigured,
    Configured,
    Extracted,
    Transformed,
    Loaded,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Unconfigured => write!(f, "unconfigured"),
            PipelineState::Configured => write!(f, "configured"),
            PipelineState::Extracted => write!(f, "extracted"),
            PipelineState::Transformed => write!(f, "transformed"),
            PipelineState::Loaded => write!(f, "loaded"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// Sequencing unit of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configure,
    Extract,
    Transform,
    Load,
}

impl Stage {
    fn required_state(&self) -> Option<PipelineState> {
        match self {
            Stage::Configure => None,
            Stage::Extract => Some(PipelineState::Configured),
            Stage::Transform => Some(PipelineState::Extracted),
            Stage::Load => Some(PipelineState::Transformed),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Configure => write!(f, "configure"),
            Stage::Extract => write!(f, "extract"),
            Stage::Transform => write!(f, "transform"),
            Stage::Load => write!(f, "load"),
        }
    }
}

/// Stage and error recorded when the pipeline enters `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

/// Timing and record count of one completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStats {
    pub stage: Stage,
    pub records: usize,
    pub duration_ms: u64,
}

/// Snapshot of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub started_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageStats>,
    pub extracted_records: usize,
    pub transformed_records: usize,
    pub outputs: Vec<PathBuf>,
    pub quality: Option<QualityReport>,
    pub failure: Option<StageFailure>,
}

/// Top-level state machine for one pipeline run.
///
/// Each orchestrator owns its configuration, plugin registry, and record
/// sets. Nothing is shared between orchestrators.
pub struct PipelineOrchestrator {
    run_id: Uuid,
    catalog: Arc<PluginCatalog>,
    registry: PluginRegistry,
    config: Option<PipelineConfig>,
    state: PipelineState,
    failure: Option<StageFailure>,
    extracted: Option<RecordSet>,
    transformed: Option<RecordSet>,
    quality: Option<QualityReport>,
    outputs: Vec<PathBuf>,
    stages: Vec<StageStats>,
    started_at: Option<DateTime<Utc>>,
    cancel: CancelSignal,
}

impl PipelineOrchestrator {
    /// Creates an unconfigured orchestrator over the built-in plugin catalog.
    pub fn new() -> Self {
        Self::with_catalog(Arc::new(PluginCatalog::builtin()))
    }

    /// Creates an unconfigured orchestrator resolving plugins against `catalog`.
    pub fn with_catalog(catalog: Arc<PluginCatalog>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            registry: PluginRegistry::new(Arc::clone(&catalog)),
            catalog,
            config: None,
            state: PipelineState::Unconfigured,
            failure: None,
            extracted: None,
            transformed: None,
            quality: None,
            outputs: Vec::new(),
            stages: Vec::new(),
            started_at: None,
            cancel: CancelSignal::new(),
        }
    }

    /// Validates and installs `config`, resetting the run.
    ///
    /// Callable from any state. Previously extracted or transformed data and
    /// cached plugin instances are discarded.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` and enters `Failed` if the
    /// configuration is invalid.
    pub fn configure(&mut self, config: PipelineConfig) -> Result<(), PipelineError> {
        self.reset();

        if let Err(e) = config.validate() {
            return Err(self.fail(Stage::Configure, e.into()));
        }

        self.registry.load_from_config(&config.plugins);

        info!(
            run_id = %self.run_id,
            data_source = %config.data_source,
            path = %config.data_source_path,
            format = %config.data_format,
            plugins = config.plugins.len(),
            "Pipeline configured"
        );

        self.config = Some(config);
        self.started_at = Some(Utc::now());
        self.state = PipelineState::Configured;
        Ok(())
    }

    /// Parses a JSON configuration object and configures the pipeline with it.
    pub fn configure_json(&mut self, value: Value) -> Result<(), PipelineError> {
        match PipelineConfig::from_value(value) {
            Ok(config) => self.configure(config),
            Err(e) => {
                self.reset();
                Err(self.fail(Stage::Configure, e.into()))
            }
        }
    }

    /// Reads records from the configured source or the bound extract plugin.
    ///
    /// The quality report of the extracted set is computed and logged.
    pub async fn extract(&mut self) -> Result<&RecordSet, PipelineError> {
        self.require(Stage::Extract)?;
        let started = Instant::now();

        let result = self.run_extract().await;
        let records = match result {
            Ok(records) => records,
            Err(e) => return Err(self.fail(Stage::Extract, e)),
        };

        let report = self.scorer().score(&records);
        info!(
            run_id = %self.run_id,
            records = records.len(),
            score = report.score,
            completeness = report.completeness,
            duplicate_ratio = report.duplicate_ratio,
            type_consistency = report.type_consistency,
            "Extraction quality report"
        );
        for issue in report.issues() {
            warn!(
                issue = %issue.issue_type,
                severity = ?issue.severity,
                "{}",
                issue.description
            );
        }

        self.record_stage(Stage::Extract, records.len(), started);
        self.quality = Some(report);
        self.state = PipelineState::Extracted;
        Ok(&*self.extracted.insert(records))
    }

    /// Applies the bound transform plugin or the configured built-in transform.
    ///
    /// Produces a new record set; the extracted set is left untouched.
    pub fn transform(&mut self) -> Result<&RecordSet, PipelineError> {
        self.require(Stage::Transform)?;
        let started = Instant::now();

        let records = match self.run_transform() {
            Ok(records) => records,
            Err(e) => return Err(self.fail(Stage::Transform, e)),
        };

        info!(run_id = %self.run_id, records = records.len(), "Transform complete");

        self.record_stage(Stage::Transform, records.len(), started);
        self.state = PipelineState::Transformed;
        Ok(&*self.transformed.insert(records))
    }

    /// Writes the transformed records to `{output_prefix}.{format}`.
    ///
    /// Returns the locations written.
    pub async fn load(
        &mut self,
        output_prefix: &str,
        format: &str,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        self.require(Stage::Load)?;
        let started = Instant::now();

        let outputs = match self.run_load(output_prefix, format).await {
            Ok(outputs) => outputs,
            Err(e) => return Err(self.fail(Stage::Load, e)),
        };

        info!(
            run_id = %self.run_id,
            outputs = ?outputs,
            "Load complete"
        );

        let rows = self.transformed.as_ref().map(RecordSet::len).unwrap_or(0);
        self.record_stage(Stage::Load, rows, started);
        self.outputs = outputs.clone();
        self.state = PipelineState::Loaded;
        Ok(outputs)
    }

    /// Runs extract, transform, and load in order from `Configured`.
    pub async fn run(
        &mut self,
        output_prefix: &str,
        format: &str,
    ) -> Result<RunSummary, PipelineError> {
        self.extract().await?;
        self.transform()?;
        self.load(output_prefix, format).await?;
        Ok(self.summary())
    }

    async fn run_extract(&self) -> Result<RecordSet, PipelineError> {
        let config = self.installed_config()?;

        if let Some(name) = &config.stages.extract {
            let plugin = self.registry.get(name)?;
            let extractor = plugin
                .as_extractor()
                .ok_or_else(|| missing_capability(name, Capability::Extract))?;
            info!(plugin = %name, "Extracting with plugin");
            let ctx = ExtractContext {
                config,
                cancel: self.cancel.clone(),
            };
            return Ok(extractor.extract(&ctx).await?);
        }

        let records = match config.data_source {
            DataSource::Local => {
                read_local(std::path::Path::new(&config.data_source_path), config.data_format)?
            }
            DataSource::Remote => {
                HttpSource::new(config.request_timeout)?
                    .read_remote(&config.data_source_path, &config.retry)
                    .await?
            }
        };
        Ok(records)
    }

    fn run_transform(&self) -> Result<RecordSet, PipelineError> {
        let config = self.installed_config()?;
        let input = self.extracted.as_ref().ok_or_else(|| self.sequencing(Stage::Transform))?;

        let output = match &config.stages.transform {
            Some(name) => {
                let plugin = self.registry.get(name)?;
                let transformer = plugin
                    .as_transformer()
                    .ok_or_else(|| missing_capability(name, Capability::Transform))?;
                info!(plugin = %name, "Transforming with plugin");
                transformer.transform(input)?
            }
            None => BuiltinTransform::from(&config.transform).transform(input)?,
        };

        if output.len() != input.len() {
            return Err(crate::error::TransformationError::RecordCountMismatch {
                expected: input.len(),
                actual: output.len(),
            }
            .into());
        }
        Ok(output)
    }

    async fn run_load(&self, output_prefix: &str, format: &str) -> Result<Vec<PathBuf>, PipelineError> {
        let config = self.installed_config()?;
        let records = self.transformed.as_ref().ok_or_else(|| self.sequencing(Stage::Load))?;
        let format: OutputFormat = format.parse()?;

        match &config.stages.load {
            Some(name) => {
                let plugin = self.registry.get(name)?;
                let loader = plugin
                    .as_loader()
                    .ok_or_else(|| missing_capability(name, Capability::Load))?;
                info!(plugin = %name, "Loading with plugin");
                Ok(loader.load(records, output_prefix, format).await?)
            }
            None => Ok(vec![export::write_records(records, output_prefix, format)?]),
        }
    }

    fn require(&self, stage: Stage) -> Result<(), PipelineError> {
        match stage.required_state() {
            Some(expected) if self.state != expected => Err(self.sequencing(stage).into()),
            _ => Ok(()),
        }
    }

    fn sequencing(&self, stage: Stage) -> SequencingError {
        SequencingError {
            stage: stage.to_string(),
            state: self.state.to_string(),
            expected: stage
                .required_state()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "any".to_string()),
        }
    }

    fn installed_config(&self) -> Result<&PipelineConfig, SequencingError> {
        self.config.as_ref().ok_or_else(|| self.sequencing(Stage::Extract))
    }

    fn scorer(&self) -> QualityScorer {
        let Some(config) = self.config.as_ref() else {
            return QualityScorer::new();
        };
        QualityScorer::new()
            .with_required_fields(config.required_fields.clone().unwrap_or_default())
            .with_expected_types(config.expected_types.clone().unwrap_or_default())
    }

    fn fail(&mut self, stage: Stage, err: PipelineError) -> PipelineError {
        error!(
            run_id = %self.run_id,
            stage = %stage,
            kind = %err.kind(),
            error = %err,
            "Pipeline stage failed"
        );
        self.failure = Some(StageFailure {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        });
        self.state = PipelineState::Failed;
        err
    }

    fn record_stage(&mut self, stage: Stage, records: usize, started: Instant) {
        self.stages.push(StageStats {
            stage,
            records,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    fn reset(&mut self) {
        self.run_id = Uuid::new_v4();
        self.config = None;
        self.failure = None;
        self.extracted = None;
        self.transformed = None;
        self.quality = None;
        self.outputs.clear();
        self.stages.clear();
        self.started_at = None;
        self.registry = PluginRegistry::new(Arc::clone(&self.catalog));
        self.state = PipelineState::Unconfigured;
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Failure recorded on entering `Failed`.
    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    pub fn config(&self) -> Option<&PipelineConfig> {
        self.config.as_ref()
    }

    /// Records produced by the last successful extract.
    pub fn extracted(&self) -> Option<&RecordSet> {
        self.extracted.as_ref()
    }

    /// Records produced by the last successful transform.
    pub fn transformed(&self) -> Option<&RecordSet> {
        self.transformed.as_ref()
    }

    /// Quality report of the extracted records.
    pub fn quality_report(&self) -> Option<&QualityReport> {
        self.quality.as_ref()
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Mutable registry access, for registering descriptors after `configure`.
    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    /// Signal that stops batch fan-out from scheduling new items.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Snapshot of the run so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            state: self.state,
            started_at: self.started_at,
            stages: self.stages.clone(),
            extracted_records: self.extracted.as_ref().map(RecordSet::len).unwrap_or(0),
            transformed_records: self.transformed.as_ref().map(RecordSet::len).unwrap_or(0),
            outputs: self.outputs.clone(),
            quality: self.quality.clone(),
            failure: self.failure.clone(),
        }
    }
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_capability(name: &str, capability: Capability) -> PluginLoadError {
    PluginLoadError::MissingCapability {
        name: name.to_string(),
        capability: capability.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformationError;
    use crate::pipeline::config::TransformSpec;
    use crate::registry::{Plugin, PluginDescriptor, PluginTarget};
    use std::fs;
    use tempfile::tempdir;

    struct DropLast;

    impl Transformer for DropLast {
        fn transform(&self, records: &RecordSet) -> Result<RecordSet, TransformationError> {
            let mut out: Vec<_> = records.iter().cloned().collect();
            out.pop();
            Ok(out.into())
        }
    }

    impl Plugin for DropLast {
        fn name(&self) -> &str {
            "drop_last"
        }

        fn as_transformer(&self) -> Option<&dyn Transformer> {
            Some(self)
        }
    }

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"[{"n": 1}, {"n": 2}]"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"[{"n": 3}]"#).unwrap();
        dir
    }

    #[test]
    fn test_new_orchestrator_is_unconfigured() {
        let orchestrator = PipelineOrchestrator::new();
        assert_eq!(orchestrator.state(), PipelineState::Unconfigured);
        assert!(orchestrator.failure().is_none());
    }

    #[tokio::test]
    async fn test_out_of_order_calls_are_sequencing_errors() {
        let mut orchestrator = PipelineOrchestrator::new();

        let err = orchestrator.extract().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Sequencing);
        assert_eq!(orchestrator.state(), PipelineState::Unconfigured);

        let dir = fixture_dir();
        orchestrator
            .configure(PipelineConfig::local(dir.path().display().to_string()))
            .unwrap();
        assert_eq!(orchestrator.transform().unwrap_err().kind(), ErrorKind::Sequencing);
        let err = orchestrator.load("out", "csv").await.unwrap_err();
        assert!(err.to_string().contains("expected transformed"));
        assert_eq!(orchestrator.state(), PipelineState::Configured);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_configure_stage() {
        let mut orchestrator = PipelineOrchestrator::new();
        let err = orchestrator
            .configure_json(serde_json::json!({"data_source": "local"}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(orchestrator.state(), PipelineState::Failed);
        assert_eq!(orchestrator.failure().unwrap().stage, Stage::Configure);
    }

    #[tokio::test]
    async fn test_extract_computes_quality() {
        let dir = fixture_dir();
        let mut orchestrator = PipelineOrchestrator::new();
        orchestrator
            .configure(PipelineConfig::local(dir.path().display().to_string()))
            .unwrap();

        assert_eq!(orchestrator.extract().await.unwrap().len(), 3);
        let report = orchestrator.quality_report().unwrap();
        assert_eq!(report.sample_size, 3);
        assert_eq!(report.score, 100);
    }

    #[tokio::test]
    async fn test_transform_count_change_fails() {
        let dir = fixture_dir();
        let mut catalog = PluginCatalog::builtin();
        catalog.register("tests", "DropLast", |_| Ok(Box::new(DropLast) as Box<dyn Plugin>));

        let config = PipelineConfig::local(dir.path().display().to_string())
            .with_plugin("dropper", PluginDescriptor::new(PluginTarget::new("tests", "DropLast")))
            .with_transform_plugin("dropper");

        let mut orchestrator = PipelineOrchestrator::with_catalog(Arc::new(catalog));
        orchestrator.configure(config).unwrap();
        orchestrator.extract().await.unwrap();

        let err = orchestrator.transform().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transformation);
        assert!(err.to_string().contains("from 3 to 2"));
        assert_eq!(orchestrator.state(), PipelineState::Failed);
        assert!(orchestrator.transformed().is_none());
    }

    #[tokio::test]
    async fn test_disabled_transform_plugin_fails_without_fallback() {
        let dir = fixture_dir();
        let config = PipelineConfig::local(dir.path().display().to_string())
            .with_plugin(
                "scaler",
                PluginDescriptor::new(PluginTarget::new(
                    "etlflow::plugins::scaling",
                    "ScalingTransformer",
                ))
                .with_enabled(false),
            )
            .with_transform_plugin("scaler");

        let mut orchestrator = PipelineOrchestrator::new();
        orchestrator.configure(config).unwrap();
        orchestrator.extract().await.unwrap();

        let err = orchestrator.transform().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginLoad);
        let failure = orchestrator.failure().unwrap();
        assert_eq!(failure.stage, Stage::Transform);
        assert_eq!(failure.kind, ErrorKind::PluginLoad);
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_load() {
        let dir = fixture_dir();
        let out = tempdir().unwrap();
        let prefix = out.path().join("out").display().to_string();

        let mut orchestrator = PipelineOrchestrator::new();
        orchestrator
            .configure(
                PipelineConfig::local(dir.path().display().to_string()).with_transform(
                    TransformSpec::Scale {
                        factor: 2.0,
                        fields: None,
                    },
                ),
            )
            .unwrap();
        orchestrator.extract().await.unwrap();
        let transformed = orchestrator.transform().unwrap();
        assert_eq!(transformed.records()[2]["n"], serde_json::json!(6));

        let err = orchestrator.load(&prefix, "xml").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert_eq!(orchestrator.state(), PipelineState::Failed);
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
        // extracted data survives the failed load
        assert_eq!(orchestrator.extracted().unwrap().records()[2]["n"], serde_json::json!(3));
    }
}
