//! Sports odds events: validation, flattening and normalisation.
//!
//! An event carries `bookmakers → markets → outcomes`. Flattening produces
//! one record per outcome with the event fields repeated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::error::TransformationError;
use crate::record::{Record, RecordSet};
use crate::registry::{Plugin, Transformer};

pub const MODULE: &str = "etlflow::plugins::sports";
pub const ENTRY_POINT: &str = "SportsOddsTransformer";

const REQUIRED_EVENT_FIELDS: [&str; 7] = [
    "id",
    "sport_key",
    "sport_title",
    "home_team",
    "away_team",
    "commence_time",
    "bookmakers",
];

fn has_keys(value: &Value, keys: &[&str]) -> bool {
    value
        .as_object()
        .map(|obj| keys.iter().all(|k| obj.contains_key(*k)))
        .unwrap_or(false)
}

/// `None` when the field is absent, `Some(Err(()))` when it is not a list.
fn list_of<'a>(value: &'a Value, key: &str) -> Option<Result<&'a Vec<Value>, ()>> {
    value.get(key).map(|v| v.as_array().ok_or(()))
}

fn valid_outcome(outcome: &Value) -> bool {
    has_keys(outcome, &["name", "price"])
}

fn valid_market(market: &Value) -> bool {
    if !has_keys(market, &["key", "last_update"]) {
        return false;
    }
    match list_of(market, "outcomes") {
        None => true,
        Some(Err(())) => false,
        Some(Ok(outcomes)) => outcomes.iter().all(valid_outcome),
    }
}

fn valid_bookmaker(bookmaker: &Value) -> bool {
    if !has_keys(bookmaker, &["key", "title"]) {
        return false;
    }
    match list_of(bookmaker, "markets") {
        None => true,
        Some(Err(())) => false,
        Some(Ok(markets)) => markets.iter().all(valid_market),
    }
}

/// Checks the structure of an odds event.
///
/// All top-level fields must be present and non-null, `bookmakers` must be a
/// list (possibly empty), and every bookmaker, market and outcome must carry
/// its identifying keys.
pub fn validate_event(event: &Record) -> bool {
    if REQUIRED_EVENT_FIELDS
        .iter()
        .any(|f| event.get(*f).map(Value::is_null).unwrap_or(true))
    {
        return false;
    }
    match event.get("bookmakers").and_then(Value::as_array) {
        Some(bookmakers) => bookmakers.iter().all(valid_bookmaker),
        None => false,
    }
}

fn field(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}

fn children<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Flattens an event into one record per bookmaker/market/outcome.
pub fn flatten_event(event: &Record) -> Vec<Record> {
    let root = Value::Object(event.clone());
    let mut rows = Vec::new();

    for bookmaker in children(&root, "bookmakers") {
        for market in children(bookmaker, "markets") {
            for outcome in children(market, "outcomes") {
                let mut row = Map::new();
                for key in ["id", "sport_key", "sport_title", "commence_time", "home_team", "away_team"] {
                    row.insert(key.to_string(), field(&root, key));
                }
                row.insert("bookmaker_key".to_string(), field(bookmaker, "key"));
                row.insert("bookmaker_title".to_string(), field(bookmaker, "title"));
                row.insert("market_key".to_string(), field(market, "key"));
                row.insert("market_last_update".to_string(), field(market, "last_update"));
                row.insert("outcome_name".to_string(), field(outcome, "name"));
                row.insert("outcome_price".to_string(), field(outcome, "price"));
                row.insert("outcome_point".to_string(), field(outcome, "point"));
                rows.push(row);
            }
        }
    }
    rows
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses a timestamp and renders it as RFC 3339 UTC.
///
/// Naive timestamps and bare dates are taken as UTC.
pub fn normalize_timestamp(s: &str) -> Option<String> {
    let s = s.trim();
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        dt.with_timezone(&Utc)
    } else if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        naive.and_utc()
    } else {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn numeric_or_null(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Parameters of [`SportsOddsTransformer`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SportsOddsSettings {
    /// Value stamped into every record's `source` field.
    pub source: String,
}

impl Default for SportsOddsSettings {
    fn default() -> Self {
        Self {
            source: "etlflow".to_string(),
        }
    }
}

/// Normalises flattened odds records without changing their count.
///
/// - `home_team` / `away_team` are title-cased
/// - `commence_time` / `market_last_update` become RFC 3339 UTC
/// - `outcome_point` becomes a number or null
/// - `processed_at` and `source` are added
#[derive(Debug, Clone)]
pub struct SportsOddsTransformer {
    settings: SportsOddsSettings,
}

impl SportsOddsTransformer {
    pub fn new(settings: SportsOddsSettings) -> Self {
        Self { settings }
    }

    fn transform_record(
        &self,
        index: usize,
        record: &Record,
        processed_at: &str,
    ) -> Result<Record, TransformationError> {
        let mut out = record.clone();

        for key in ["home_team", "away_team"] {
            if let Some(Value::String(team)) = out.get_mut(key) {
                *team = title_case(team);
            }
        }

        for key in ["commence_time", "market_last_update"] {
            if let Some(Value::String(raw)) = out.get_mut(key) {
                let normalized = normalize_timestamp(raw).ok_or_else(|| {
                    TransformationError::UnhandledValue {
                        index,
                        field: key.to_string(),
                        reason: format!("unparseable timestamp '{}'", raw),
                    }
                })?;
                *raw = normalized;
            }
        }

        if let Some(point) = out.get_mut("outcome_point") {
            let coerced = numeric_or_null(point);
            *point = coerced;
        }

        out.insert(
            "processed_at".to_string(),
            Value::String(processed_at.to_string()),
        );
        out.insert(
            "source".to_string(),
            Value::String(self.settings.source.clone()),
        );
        Ok(out)
    }
}

impl Transformer for SportsOddsTransformer {
    fn transform(&self, records: &RecordSet) -> Result<RecordSet, TransformationError> {
        let processed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        records
            .iter()
            .enumerate()
            .map(|(index, record)| self.transform_record(index, record, &processed_at))
            .collect()
    }
}

impl Plugin for SportsOddsTransformer {
    fn name(&self) -> &str {
        ENTRY_POINT
    }

    fn as_transformer(&self) -> Option<&dyn Transformer> {
        Some(self)
    }
}
