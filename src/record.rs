//! In-memory record model shared by every pipeline stage.
//!
//! A [`Record`] is a JSON object with heterogeneous values; a [`RecordSet`]
//! keeps records in extraction order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExtractionError;

/// A single record: field name to JSON value.
pub type Record = Map<String, Value>;

/// Ordered collection of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    /// Creates an empty record set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Borrow the records as a slice.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Appends a record.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Appends all records of `other`, keeping their order.
    pub fn extend(&mut self, other: RecordSet) {
        self.records.extend(other.records);
    }

    /// Consumes the set, returning the records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Sorted union of all top-level keys.
    pub fn field_names(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect()
    }

    /// Builds a record set from a parsed JSON document.
    ///
    /// Accepts an array of objects, a single object, or an object carrying a
    /// `data` array envelope. Anything else is malformed.
    pub fn from_json(value: Value, origin: &str) -> Result<Self, ExtractionError> {
        match value {
            Value::Array(items) => Self::from_items(items, origin),
            Value::Object(mut obj) => {
                if matches!(obj.get("data"), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = obj.remove("data") {
                        return Self::from_items(items, origin);
                    }
                }
                Ok(Self::from(vec![obj]))
            }
            other => Err(ExtractionError::Malformed {
                origin: origin.to_string(),
                reason: format!(
                    "expected a JSON object or array, found {}",
                    ValueType::of(&other)
                ),
            }),
        }
    }

    fn from_items(items: Vec<Value>, origin: &str) -> Result<Self, ExtractionError> {
        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(obj) => records.push(obj),
                other => {
                    return Err(ExtractionError::Malformed {
                        origin: origin.to_string(),
                        reason: format!(
                            "item {} is a {}, expected an object",
                            index,
                            ValueType::of(&other)
                        ),
                    })
                }
            }
        }
        Ok(Self { records })
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// JSON value type, used for schema-drift detection and column inference.
///
/// Deserialises from the names printed by `Display`, plus common dtype
/// aliases (`bool`, `int64`, `float64`, `str`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Null,
    #[serde(rename = "boolean", alias = "bool")]
    Bool,
    #[serde(
        alias = "integer",
        alias = "int",
        alias = "int64",
        alias = "float",
        alias = "float64"
    )]
    Number,
    #[serde(alias = "str", alias = "text")]
    String,
    Array,
    Object,
}

impl ValueType {
    /// Classifies a value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Bool => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// Flattens nested objects and arrays into dotted / indexed keys.
///
/// `{"a": {"b": 1}, "c": [2, 3]}` becomes `{"a.b": 1, "c.0": 2, "c.1": 3}`.
/// Empty containers are kept as-is under their own key.
pub fn flatten_record(record: &Record) -> Record {
    let mut out = Map::new();
    for (key, value) in record {
        flatten_into(key, value, &mut out);
    }
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Record) {
    match value {
        Value::Object(obj) if !obj.is_empty() => {
            for (key, nested) in obj {
                flatten_into(&format!("{}.{}", prefix, key), nested, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(&format!("{}.{}", prefix, index), nested, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}
