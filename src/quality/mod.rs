//! Data quality scoring for extracted record sets.
//!
//! The scorer measures completeness, duplication, and type consistency and
//! combines them into a 0-100 score. Scoring is a pure function of the
//! record set: the same input always yields the same report.

mod report;
mod scorer;

pub use report::{QualityIssue, QualityIssueType, QualityReport, Severity};
pub use scorer::{record_fingerprint, QualityScorer};
