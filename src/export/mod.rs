//! Output writers for loaded record sets.
//!
//! Provides CSV and Parquet export. Both writers flatten nested values into
//! dotted keys and write through a temp file that is renamed into place, so
//! a failed write never leaves a partial output behind.

pub mod csv_writer;
pub mod parquet_writer;

pub use csv_writer::write_csv;
pub use parquet_writer::{records_to_record_batch, write_parquet};

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::LoadError;
use crate::record::RecordSet;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    /// File extension for this format, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "parquet" => Ok(OutputFormat::Parquet),
            _ => Err(LoadError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Path written for `prefix` in `format`: `{prefix}.csv` or `{prefix}.parquet`.
pub fn output_path(prefix: &str, format: OutputFormat) -> PathBuf {
    PathBuf::from(format!("{}.{}", prefix, format.extension()))
}

/// Writes `records` to `{prefix}.{format}`, parsing the format name first.
pub fn write(records: &RecordSet, prefix: &str, format: &str) -> Result<PathBuf, LoadError> {
    let format: OutputFormat = format.parse()?;
    write_records(records, prefix, format)
}

/// Writes `records` to `{prefix}.{format}` and returns the path written.
pub fn write_records(
    records: &RecordSet,
    prefix: &str,
    format: OutputFormat,
) -> Result<PathBuf, LoadError> {
    let path = output_path(prefix, format);
    match format {
        OutputFormat::Csv => write_csv(records, &path)?,
        OutputFormat::Parquet => write_parquet(records, &path)?,
    }
    Ok(path)
}

/// Writes `bytes` to `path` atomically, creating parent directories.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LoadError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| LoadError::WriteFailed {
        path: path.to_path_buf(),
        message: e.error.to_string(),
    })?;
    Ok(())
}
