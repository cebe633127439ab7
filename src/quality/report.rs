//! Quality report and the issues derived from it.

use std::collections::BTreeMap;

use serde::Serialize;

/// Severity levels for quality issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Most of the signal is bad.
    Major,
    /// Noticeable but limited.
    Minor,
    /// Logged only.
    Warning,
}

/// Kinds of quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssueType {
    EmptySample,
    MissingValues,
    DuplicateRecords,
    TypeDrift,
    SchemaMismatch,
}

impl std::fmt::Display for QualityIssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QualityIssueType::EmptySample => "empty_sample",
            QualityIssueType::MissingValues => "missing_values",
            QualityIssueType::DuplicateRecords => "duplicate_records",
            QualityIssueType::TypeDrift => "type_drift",
            QualityIssueType::SchemaMismatch => "schema_mismatch",
        };
        write!(f, "{}", name)
    }
}

/// A specific quality problem found in a record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub issue_type: QualityIssueType,
    pub severity: Severity,
    pub description: String,
}

impl QualityIssue {
    pub fn new(
        issue_type: QualityIssueType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            description: description.into(),
        }
    }
}

/// Quality metrics of one record set snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    /// Share of required field occurrences that are present and non-null (0.0 - 1.0).
    pub completeness: f64,
    /// Share of records equal to an earlier record (0.0 - 1.0).
    pub duplicate_ratio: f64,
    /// Share of non-null field occurrences matching the field's first seen type (0.0 - 1.0).
    pub type_consistency: f64,
    /// Composite score (0 - 100).
    pub score: u8,
    /// Number of records scored.
    pub sample_size: usize,
    /// Missing or null occurrences per required field.
    pub missing_per_field: BTreeMap<String, usize>,
    /// Indices of records that repeat an earlier record.
    pub duplicate_indices: Vec<usize>,
    /// Fields that carried more than one value type.
    pub drifting_fields: Vec<String>,
    /// Whether every declared field exists with its declared type; `None`
    /// when no types were declared.
    pub schema_valid: Option<bool>,
    /// Declared fields that are absent or carry another type.
    pub schema_violations: Vec<String>,
}

impl QualityReport {
    /// Report for an empty record set.
    pub fn empty() -> Self {
        Self {
            completeness: 0.0,
            duplicate_ratio: 0.0,
            type_consistency: 0.0,
            score: 0,
            sample_size: 0,
            missing_per_field: BTreeMap::new(),
            duplicate_indices: Vec::new(),
            drifting_fields: Vec::new(),
            schema_valid: None,
            schema_violations: Vec::new(),
        }
    }

    /// Problems worth reporting, most severe first.
    pub fn issues(&self) -> Vec<QualityIssue> {
        if self.sample_size == 0 {
            return vec![QualityIssue::new(
                QualityIssueType::EmptySample,
                Severity::Major,
                "record set is empty",
            )];
        }

        let mut issues = Vec::new();

        if self.completeness < 1.0 {
            let fields: Vec<String> = self
                .missing_per_field
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(field, n)| format!("{} ({})", field, n))
                .collect();
            issues.push(QualityIssue::new(
                QualityIssueType::MissingValues,
                severity_for(1.0 - self.completeness),
                format!("missing values in {}", fields.join(", ")),
            ));
        }

        if !self.duplicate_indices.is_empty() {
            issues.push(QualityIssue::new(
                QualityIssueType::DuplicateRecords,
                severity_for(self.duplicate_ratio),
                format!(
                    "{} of {} records repeat an earlier record",
                    self.duplicate_indices.len(),
                    self.sample_size
                ),
            ));
        }

        if !self.drifting_fields.is_empty() {
            issues.push(QualityIssue::new(
                QualityIssueType::TypeDrift,
                severity_for(1.0 - self.type_consistency),
                format!("mixed value types in {}", self.drifting_fields.join(", ")),
            ));
        }

        if self.schema_valid == Some(false) {
            issues.push(QualityIssue::new(
                QualityIssueType::SchemaMismatch,
                Severity::Major,
                format!(
                    "declared types not met by {}",
                    self.schema_violations.join(", ")
                ),
            ));
        }

        issues.sort_by_key(|issue| issue.severity);
        issues
    }
}

fn severity_for(bad_share: f64) -> Severity {
    if bad_share >= 0.5 {
        Severity::Major
    } else if bad_share >= 0.1 {
        Severity::Minor
    } else {
        Severity::Warning
    }
}

impl std::fmt::Display for QualityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "score={} sample_size={} completeness={:.3} duplicate_ratio={:.3} type_consistency={:.3}",
            self.score,
            self.sample_size,
            self.completeness,
            self.duplicate_ratio,
            self.type_consistency
        )
    }
}
