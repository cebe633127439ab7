//! CSV writer.

use std::collections::BTreeSet;
use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;
use crate::record::{flatten_record, Record, RecordSet};

/// Sorted union of flattened keys across all records.
pub fn flattened_header(records: &[Record]) -> Vec<String> {
    let mut keys = BTreeSet::new();
    for record in records {
        keys.extend(record.keys().cloned());
    }
    keys.into_iter().collect()
}

/// Renders one value as a CSV cell. Null and absent fields are empty.
pub fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Renders `records` as CSV bytes with a header row.
///
/// An empty record set renders as empty output. Records that all lack
/// fields are rejected, since a header-less file cannot be read back.
pub fn to_csv_bytes(records: &RecordSet) -> Result<Vec<u8>, LoadError> {
    let flat: Vec<Record> = records.iter().map(flatten_record).collect();
    let header = flattened_header(&flat);

    if header.is_empty() {
        if flat.is_empty() {
            return Ok(Vec::new());
        }
        return Err(LoadError::NoFields(flat.len()));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for record in &flat {
        writer.write_record(header.iter().map(|key| cell(record.get(key))))?;
    }

    writer.into_inner().map_err(|e| LoadError::Io(e.into_error()))
}

/// Writes `records` to `path` as CSV.
pub fn write_csv(records: &RecordSet, path: &Path) -> Result<(), LoadError> {
    let bytes = to_csv_bytes(records)?;
    super::write_atomic(path, &bytes)?;

    tracing::info!(
        path = %path.display(),
        rows = records.len(),
        "CSV file written"
    );

    Ok(())
}
