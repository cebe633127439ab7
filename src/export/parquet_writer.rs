//! Parquet writer.
//!
//! The schema is inferred from the flattened records: a column whose non-null
//! values are all booleans is `Boolean`, all integers is `Int64`, any mix of
//! numbers is `Float64`, and everything else is `Utf8`. Every column is
//! nullable since records need not share keys.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::Value;

use super::csv_writer::flattened_header;
use crate::error::LoadError;
use crate::record::{flatten_record, Record, RecordSet};

fn infer_type(records: &[Record], key: &str) -> DataType {
    let mut all_bool = true;
    let mut all_int = true;
    let mut all_number = true;
    let mut seen = false;

    for value in records.iter().filter_map(|r| r.get(key)) {
        match value {
            Value::Null => continue,
            Value::Bool(_) => {
                all_int = false;
                all_number = false;
            }
            Value::Number(n) => {
                all_bool = false;
                if n.as_i64().is_none() {
                    all_int = false;
                }
            }
            _ => {
                all_bool = false;
                all_int = false;
                all_number = false;
            }
        }
        seen = true;
    }

    match (seen, all_bool, all_int, all_number) {
        (false, _, _, _) => DataType::Utf8,
        (true, true, _, _) => DataType::Boolean,
        (true, _, true, _) => DataType::Int64,
        (true, _, _, true) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

fn build_column(records: &[Record], key: &str, data_type: &DataType) -> ArrayRef {
    let values = records.iter().map(|r| r.get(key).filter(|v| !v.is_null()));
    match data_type {
        DataType::Boolean => {
            let mut builder = BooleanBuilder::new();
            for value in values {
                builder.append_option(value.and_then(Value::as_bool));
            }
            Arc::new(builder.finish())
        }
        DataType::Int64 => {
            let mut builder = Int64Builder::new();
            for value in values {
                builder.append_option(value.and_then(Value::as_i64));
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::new();
            for value in values {
                builder.append_option(value.and_then(Value::as_f64));
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::new();
            for value in values {
                match value {
                    Some(Value::String(s)) => builder.append_value(s),
                    Some(other) => builder.append_value(other.to_string()),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

/// Converts a record set into a single Arrow RecordBatch.
pub fn records_to_record_batch(records: &RecordSet) -> Result<RecordBatch, LoadError> {
    let flat: Vec<Record> = records.iter().map(flatten_record).collect();
    let header = flattened_header(&flat);

    let mut fields = Vec::with_capacity(header.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(header.len());
    for key in &header {
        let data_type = infer_type(&flat, key);
        columns.push(build_column(&flat, key, &data_type));
        fields.push(Field::new(key, data_type, true));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Write records to a Parquet file on disk.
pub fn write_parquet(records: &RecordSet, output_path: &Path) -> Result<(), LoadError> {
    let batch = records_to_record_batch(records)?;
    if batch.num_columns() == 0 {
        return Err(LoadError::WriteFailed {
            path: output_path.to_path_buf(),
            message: "record set has no columns".to_string(),
        });
    }

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    super::write_atomic(output_path, &buf)?;

    tracing::info!(
        path = %output_path.display(),
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "Parquet file written"
    );

    Ok(())
}
