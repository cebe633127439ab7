//! Quality scorer.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::report::QualityReport;
use crate::record::{Record, RecordSet, ValueType};

/// Computes [`QualityReport`]s.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    required_fields: Vec<String>,
    expected_types: BTreeMap<String, ValueType>,
}

impl QualityScorer {
    /// Scorer that treats the union of keys as the required fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts completeness to the given fields.
    pub fn with_required_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Declares field types. Declared fields are checked against their
    /// declared type instead of the first type seen, and the report carries
    /// a schema verdict.
    pub fn with_expected_types(mut self, types: BTreeMap<String, ValueType>) -> Self {
        self.expected_types = types;
        self
    }

    pub fn expected_types(&self) -> &BTreeMap<String, ValueType> {
        &self.expected_types
    }

    /// Scores a record set snapshot.
    pub fn score(&self, records: &RecordSet) -> QualityReport {
        if records.is_empty() {
            return QualityReport::empty();
        }

        let fields: BTreeSet<String> = if self.required_fields.is_empty() {
            records.field_names()
        } else {
            self.required_fields.iter().cloned().collect()
        };

        let (completeness, missing_per_field) = completeness(records.records(), &fields);
        let duplicate_indices = duplicate_indices(records.records());
        let duplicate_ratio = duplicate_indices.len() as f64 / records.len() as f64;
        let (type_consistency, drifting_fields) =
            type_consistency(records.records(), &self.expected_types);
        let schema_violations = schema_violations(records.records(), &self.expected_types);
        let schema_valid = if self.expected_types.is_empty() {
            None
        } else {
            Some(schema_violations.is_empty())
        };

        let mean = (completeness + (1.0 - duplicate_ratio) + type_consistency) / 3.0;
        let score = (100.0 * mean).round().clamp(0.0, 100.0) as u8;

        debug!(
            sample_size = records.len(),
            fields = fields.len(),
            score = score,
            "Scored record set"
        );

        QualityReport {
            completeness,
            duplicate_ratio,
            type_consistency,
            score,
            sample_size: records.len(),
            missing_per_field,
            duplicate_indices,
            drifting_fields,
            schema_valid,
            schema_violations,
        }
    }
}

fn completeness(records: &[Record], fields: &BTreeSet<String>) -> (f64, BTreeMap<String, usize>) {
    let mut missing_per_field = BTreeMap::new();
    let mut missing = 0usize;

    for field in fields {
        let count = records
            .iter()
            .filter(|r| r.get(field).map(Value::is_null).unwrap_or(true))
            .count();
        missing += count;
        missing_per_field.insert(field.clone(), count);
    }

    let total = records.len() * fields.len();
    if total == 0 {
        return (1.0, missing_per_field);
    }
    (1.0 - missing as f64 / total as f64, missing_per_field)
}

fn duplicate_indices(records: &[Record]) -> Vec<usize> {
    let mut seen = HashSet::new();
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| !seen.insert(record_fingerprint(record)))
        .map(|(index, _)| index)
        .collect()
}

fn type_consistency(
    records: &[Record],
    expected_types: &BTreeMap<String, ValueType>,
) -> (f64, Vec<String>) {
    let mut first_seen: HashMap<&str, ValueType> = expected_types
        .iter()
        .map(|(field, kind)| (field.as_str(), *kind))
        .collect();
    let mut drifting = BTreeSet::new();
    let mut observed = 0usize;
    let mut matching = 0usize;

    for record in records {
        for (key, value) in record {
            if value.is_null() {
                continue;
            }
            let kind = ValueType::of(value);
            let expected = *first_seen.entry(key.as_str()).or_insert(kind);
            observed += 1;
            if kind == expected {
                matching += 1;
            } else {
                drifting.insert(key.clone());
            }
        }
    }

    let ratio = if observed == 0 {
        1.0
    } else {
        matching as f64 / observed as f64
    };
    (ratio, drifting.into_iter().collect())
}

/// Declared fields that no record carries, or whose non-null values have
/// another type.
fn schema_violations(
    records: &[Record],
    expected_types: &BTreeMap<String, ValueType>,
) -> Vec<String> {
    expected_types
        .iter()
        .filter(|(field, kind)| {
            let mut values = records.iter().filter_map(|r| r.get(field.as_str())).peekable();
            values.peek().is_none()
                || values.any(|v| !v.is_null() && ValueType::of(v) != **kind)
        })
        .map(|(field, _)| field.clone())
        .collect()
}

/// Hex SHA-256 of a record's canonical JSON form.
///
/// Object keys are sorted at every level so that records with equal content
/// but different key order hash identically.
pub fn record_fingerprint(record: &Record) -> String {
    let mut canonical = String::new();
    write_canonical(&Value::Object(record.clone()), &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
