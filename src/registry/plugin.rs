//! Capability traits implemented by plugins.
//!
//! A plugin implements any subset of {extract, extract_with_retry, transform,
//! load}. The orchestrator checks for the capability it needs through the
//! `as_*` accessors and fails with
//! [`PluginLoadError::MissingCapability`](crate::error::PluginLoadError::MissingCapability)
//! when it is absent.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{ExtractionError, LoadError, TransformationError};
use crate::export::OutputFormat;
use crate::pipeline::config::PipelineConfig;
use crate::record::RecordSet;
use crate::retry::{Attempted, CancelSignal};

/// Context handed to extractors.
#[derive(Debug, Clone)]
pub struct ExtractContext<'a> {
    pub config: &'a PipelineConfig,
    pub cancel: CancelSignal,
}

/// Produces a record set.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, ctx: &ExtractContext<'_>) -> Result<RecordSet, ExtractionError>;
}

/// Fetches one item with the plugin's own retry policy.
#[async_trait]
pub trait RetryingExtractor: Send + Sync {
    async fn extract_with_retry(&self, item: &str) -> Result<Attempted<RecordSet>, ExtractionError>;
}

/// Maps a record set to a new record set of the same length.
pub trait Transformer: Send + Sync {
    fn transform(&self, records: &RecordSet) -> Result<RecordSet, TransformationError>;
}

/// Writes a record set somewhere and reports the locations written.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(
        &self,
        records: &RecordSet,
        output_prefix: &str,
        format: OutputFormat,
    ) -> Result<Vec<PathBuf>, LoadError>;
}

/// Capabilities a plugin can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Extract,
    ExtractWithRetry,
    Transform,
    Load,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Extract => "extract",
            Capability::ExtractWithRetry => "extract_with_retry",
            Capability::Transform => "transform",
            Capability::Load => "load",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A live, configured plugin instance.
pub trait Plugin: Send + Sync {
    /// Human-readable plugin name.
    fn name(&self) -> &str;

    fn as_extractor(&self) -> Option<&dyn Extractor> {
        None
    }

    fn as_retrying_extractor(&self) -> Option<&dyn RetryingExtractor> {
        None
    }

    fn as_transformer(&self) -> Option<&dyn Transformer> {
        None
    }

    fn as_loader(&self) -> Option<&dyn Loader> {
        None
    }

    /// Capabilities this instance provides.
    fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.as_extractor().is_some() {
            caps.push(Capability::Extract);
        }
        if self.as_retrying_extractor().is_some() {
            caps.push(Capability::ExtractWithRetry);
        }
        if self.as_transformer().is_some() {
            caps.push(Capability::Transform);
        }
        if self.as_loader().is_some() {
            caps.push(Capability::Load);
        }
        caps
    }
}
