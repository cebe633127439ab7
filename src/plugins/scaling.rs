//! Numeric scaling transform as a selectable plugin.

use serde::Deserialize;

use crate::error::TransformationError;
use crate::pipeline::transform::scale_records;
use crate::record::RecordSet;
use crate::registry::{Plugin, Transformer};

pub const MODULE: &str = "etlflow::plugins::scaling";
pub const ENTRY_POINT: &str = "ScalingTransformer";

/// Parameters of [`ScalingTransformer`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScalingSettings {
    pub factor: f64,
    /// Top-level fields to scale; every numeric field when absent.
    pub fields: Option<Vec<String>>,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            factor: 2.0,
            fields: None,
        }
    }
}

/// Multiplies numeric fields by a constant factor.
#[derive(Debug, Clone)]
pub struct ScalingTransformer {
    settings: ScalingSettings,
}

impl ScalingTransformer {
    pub fn new(settings: ScalingSettings) -> Result<Self, String> {
        if !settings.factor.is_finite() {
            return Err(format!("factor must be finite, got {}", settings.factor));
        }
        Ok(Self { settings })
    }
}

impl Transformer for ScalingTransformer {
    fn transform(&self, records: &RecordSet) -> Result<RecordSet, TransformationError> {
        scale_records(records, self.settings.factor, self.settings.fields.as_deref())
    }
}

impl Plugin for ScalingTransformer {
    fn name(&self) -> &str {
        ENTRY_POINT
    }

    fn as_transformer(&self) -> Option<&dyn Transformer> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_factor_doubles() {
        let plugin = ScalingTransformer::new(ScalingSettings::default()).unwrap();
        let records = RecordSet::from_json(json!([{"v": 2}, {"v": 0.5}]), "test").unwrap();
        let out = plugin.as_transformer().unwrap().transform(&records).unwrap();
        assert_eq!(out.records()[0]["v"], json!(4));
        assert_eq!(out.records()[1]["v"], json!(1.0));
    }
}
