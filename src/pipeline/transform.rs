//! Built-in transforms.

use serde_json::{Number, Value};

use super::config::TransformSpec;
use crate::error::TransformationError;
use crate::record::{Record, RecordSet};
use crate::registry::Transformer;

/// Transform selected by [`TransformSpec`] when no transform plugin is bound.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinTransform {
    spec: TransformSpec,
}

impl BuiltinTransform {
    pub fn new(spec: TransformSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &TransformSpec {
        &self.spec
    }
}

impl From<&TransformSpec> for BuiltinTransform {
    fn from(spec: &TransformSpec) -> Self {
        Self::new(spec.clone())
    }
}

impl Transformer for BuiltinTransform {
    fn transform(&self, records: &RecordSet) -> Result<RecordSet, TransformationError> {
        match &self.spec {
            TransformSpec::Identity => Ok(records.clone()),
            TransformSpec::Scale { factor, fields } => {
                scale_records(records, *factor, fields.as_deref())
            }
        }
    }
}

/// Multiplies numeric top-level fields by `factor`.
///
/// Only `fields` are touched when given. Integers stay integers when the
/// factor is integral and the product fits in an `i64`. Non-numeric values
/// pass through unchanged.
pub fn scale_records(
    records: &RecordSet,
    factor: f64,
    fields: Option<&[String]>,
) -> Result<RecordSet, TransformationError> {
    if !factor.is_finite() {
        return Err(TransformationError::InvalidConfig(format!(
            "scale factor must be finite, got {}",
            factor
        )));
    }

    records
        .iter()
        .enumerate()
        .map(|(index, record)| scale_record(index, record, factor, fields))
        .collect()
}

fn scale_record(
    index: usize,
    record: &Record,
    factor: f64,
    fields: Option<&[String]>,
) -> Result<Record, TransformationError> {
    let mut out = record.clone();
    for (key, value) in out.iter_mut() {
        if let Some(only) = fields {
            if !only.iter().any(|f| f == key) {
                continue;
            }
        }
        if let Value::Number(n) = value {
            *value = Value::Number(scale_number(n, factor).ok_or_else(|| {
                TransformationError::UnhandledValue {
                    index,
                    field: key.clone(),
                    reason: format!("{} * {} is not a finite number", n, factor),
                }
            })?);
        }
    }
    Ok(out)
}

fn scale_number(n: &Number, factor: f64) -> Option<Number> {
    if factor.fract() == 0.0 && factor.abs() < i64::MAX as f64 {
        if let Some(product) = n.as_i64().and_then(|i| i.checked_mul(factor as i64)) {
            return Some(Number::from(product));
        }
    }
    n.as_f64().and_then(|f| Number::from_f64(f * factor))
}
