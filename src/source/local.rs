//! Local directory reader.

use std::fs::File;
use std::path::Path;

use arrow::json::writer::{JsonArray, WriterBuilder};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::ExtractionError;
use crate::pipeline::config::DataFormat;
use crate::record::RecordSet;

/// Reads every file of `format` directly under `dir`.
///
/// Files are visited in filename order so the concatenated record set does
/// not depend on filesystem iteration order. Subdirectories are not entered.
pub fn read_local(dir: &Path, format: DataFormat) -> Result<RecordSet, ExtractionError> {
    if !dir.is_dir() {
        return Err(ExtractionError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut records = RecordSet::new();
    let mut files = 0usize;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ExtractionError::ReadFailed {
            path: dir.to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
        })?;

        let path = entry.path();
        if !entry.file_type().is_file() || !format.matches(path) {
            continue;
        }

        let file_records = match format {
            DataFormat::Json => read_json_file(path)?,
            DataFormat::Parquet => read_parquet_file(path)?,
        };
        debug!(path = %path.display(), records = file_records.len(), "Read data file");
        records.extend(file_records);
        files += 1;
    }

    info!(
        dir = %dir.display(),
        files = files,
        records = records.len(),
        format = %format,
        "Local extraction complete"
    );

    Ok(records)
}

/// Parses one JSON file into records.
pub fn read_json_file(path: &Path) -> Result<RecordSet, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| ExtractionError::Malformed {
        origin: origin.clone(),
        reason: e.to_string(),
    })?;
    RecordSet::from_json(value, &origin)
}

/// Reads one Parquet file into records, one record per row.
pub fn read_parquet_file(path: &Path) -> Result<RecordSet, ExtractionError> {
    let parquet_err = |message: String| ExtractionError::Parquet {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|source| ExtractionError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .map_err(|e| parquet_err(e.to_string()))?;

    let mut records = RecordSet::new();
    for batch in reader {
        let batch = batch.map_err(|e| parquet_err(e.to_string()))?;
        if batch.num_rows() == 0 {
            continue;
        }

        let mut buf = Vec::new();
        {
            let mut writer = WriterBuilder::new()
                .with_explicit_nulls(true)
                .build::<_, JsonArray>(&mut buf);
            writer
                .write(&batch)
                .and_then(|_| writer.finish())
                .map_err(|e| parquet_err(e.to_string()))?;
        }

        let rows: Value = serde_json::from_slice(&buf).map_err(|e| parquet_err(e.to_string()))?;
        records.extend(RecordSet::from_json(rows, &path.display().to_string())?);
    }

    Ok(records)
}
