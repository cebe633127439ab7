//! Sports, events and odds from FantasyAce cloud-function endpoints.
//!
//! `extract` lists the sports (for title lookup), lists the events of the
//! configured sport, fetches the odds of every event concurrently, normalises and
//! validates each event, then flattens it into one record per
//! bookmaker/market/outcome.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::sports::{flatten_event, validate_event};
use crate::error::ExtractionError;
use crate::record::{Record, RecordSet};
use crate::pipeline::config::DEFAULT_MAX_CONCURRENCY;
use crate::registry::{ExtractContext, Extractor, Plugin};
use crate::retry::{fan_out, RetryPolicy};
use crate::source::remote::remote_error;
use crate::source::{FetchError, HttpSource};

pub const MODULE: &str = "etlflow::plugins::fantasyace";
pub const ENTRY_POINT: &str = "FantasyAceCloudFunctions";

/// Parameters of [`FantasyAceCloudFunctions`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FantasyAceSettings {
    pub base_url_sports: Option<String>,
    pub base_url_events: Option<String>,
    pub base_url_event_odds: Option<String>,
    /// Sport whose events `extract` collects.
    pub sport_key: Option<String>,
    pub limit: u32,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub request_timeout_secs: f64,
}

impl Default for FantasyAceSettings {
    fn default() -> Self {
        Self {
            base_url_sports: None,
            base_url_events: None,
            base_url_event_odds: None,
            sport_key: None,
            limit: 50,
            max_retries: 3,
            retry_delay_secs: 1.0,
            request_timeout_secs: 10.0,
        }
    }
}

/// Client for the sports / events / event-odds endpoints.
#[derive(Debug, Clone)]
pub struct FantasyAceCloudFunctions {
    settings: FantasyAceSettings,
    policy: RetryPolicy,
    source: HttpSource,
}

impl FantasyAceCloudFunctions {
    pub fn new(settings: FantasyAceSettings) -> Result<Self, String> {
        let policy = super::fixed_delay_policy(settings.max_retries, settings.retry_delay_secs)?;
        let timeout = Duration::try_from_secs_f64(settings.request_timeout_secs)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or_else(|| {
                format!(
                    "request_timeout_secs must be a positive number, got {}",
                    settings.request_timeout_secs
                )
            })?;
        let source = HttpSource::new(timeout).map_err(|e| e.to_string())?;

        Ok(Self {
            settings,
            policy,
            source,
        })
    }

    pub fn settings(&self) -> &FantasyAceSettings {
        &self.settings
    }

    async fn get_with_retry(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ExtractionError> {
        let fetched = self
            .policy
            .execute(|_| self.source.fetch_json(url, params))
            .await
            .map_err(|e| remote_error(url, e))?;
        Ok(fetched.value)
    }

    fn endpoint<'a>(
        &self,
        url: &'a Option<String>,
        name: &str,
    ) -> Result<&'a str, ExtractionError> {
        url.as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ExtractionError::Plugin(format!("{} is not configured", name)))
    }

    /// Lists sports. Accepts a bare array, `{"sports": [...]}` or `{"data": [...]}`.
    pub async fn list_sports(&self) -> Result<Vec<Record>, ExtractionError> {
        let url = self.endpoint(&self.settings.base_url_sports, "base_url_sports")?;
        let body = self.get_with_retry(url, &[]).await?;
        Ok(unwrap_list(body, "sports"))
    }

    /// Lists up to `limit` events of a sport.
    pub async fn list_events(
        &self,
        sport_key: &str,
        limit: u32,
    ) -> Result<Vec<Record>, ExtractionError> {
        let url = self.endpoint(&self.settings.base_url_events, "base_url_events")?;
        let params = [("sportKey", sport_key.to_string()), ("limit", limit.to_string())];
        let body = self.get_with_retry(url, &params).await?;
        Ok(unwrap_list(body, "events"))
    }

    /// Fetches the odds document of one event; empty when the endpoint has none.
    pub async fn get_event_odds(&self, event_id: &str) -> Result<Record, ExtractionError> {
        let url = self.endpoint(&self.settings.base_url_event_odds, "base_url_event_odds")?;
        let fetched = self
            .policy
            .execute(|_| self.fetch_event_odds(url, event_id))
            .await
            .map_err(|e| remote_error(url, e))?;
        Ok(fetched.value)
    }

    /// One attempt at the odds document of one event.
    async fn fetch_event_odds(&self, url: &str, event_id: &str) -> Result<Record, FetchError> {
        let body = self
            .source
            .fetch_json(url, &[("eventId", event_id.to_string())])
            .await?;
        Ok(first_odds_document(body))
    }

    /// Collects, validates and flattens the events of `sport_key`.
    ///
    /// Odds are fetched concurrently, one retry sequence per event. An event
    /// whose odds fetch fails is skipped; the extraction fails only when no
    /// odds fetch succeeded or a response was malformed.
    pub async fn extract_events_and_odds(
        &self,
        sport_key: &str,
        limit: u32,
        ctx: Option<&ExtractContext<'_>>,
    ) -> Result<RecordSet, ExtractionError> {
        let sports_map = sports_title_map(&self.list_sports().await?);
        let events = self.list_events(sport_key, limit).await?;
        let url = self.endpoint(&self.settings.base_url_event_odds, "base_url_event_odds")?;

        let mut stubs = Vec::with_capacity(events.len());
        let mut ids = Vec::with_capacity(events.len());
        for stub in &events {
            if let Some(id) = event_id(stub, &Map::new()) {
                stubs.push(stub);
                ids.push(id);
            }
        }

        let concurrency = ctx
            .map(|c| c.config.max_concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY);
        let cancel = ctx.map(|c| c.cancel.clone()).unwrap_or_default();

        let outcome = fan_out(ids, concurrency, &self.policy, &cancel, |id| async move {
            self.fetch_event_odds(url, &id).await
        })
        .await
        .into_result()?;

        if !outcome.is_complete() {
            warn!(
                succeeded = outcome.successes.len(),
                failed = outcome.failures.len(),
                cancelled = outcome.cancelled.len(),
                "Some event odds could not be fetched"
            );
        }

        let mut records = RecordSet::new();
        let mut kept = 0usize;

        for success in &outcome.successes {
            let stub = stubs[success.index];
            let Some(event) = normalize_event(stub, &success.value, &sports_map, Some(sport_key))
            else {
                continue;
            };
            if !validate_event(&event) {
                debug!(event_id = %success.item, "Dropping invalid event");
                continue;
            }

            kept += 1;
            records.extend(flatten_event(&event).into());
        }

        info!(
            sport_key = sport_key,
            events = events.len(),
            valid_events = kept,
            records = records.len(),
            "FantasyAce extraction complete"
        );
        Ok(records)
    }
}

#[async_trait]
impl Extractor for FantasyAceCloudFunctions {
    async fn extract(&self, ctx: &ExtractContext<'_>) -> Result<RecordSet, ExtractionError> {
        let sport_key = self
            .settings
            .sport_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ExtractionError::Plugin("sport_key is not configured".to_string()))?;
        self.extract_events_and_odds(sport_key, self.settings.limit, Some(ctx))
            .await
    }
}

impl Plugin for FantasyAceCloudFunctions {
    fn name(&self) -> &str {
        ENTRY_POINT
    }

    fn as_extractor(&self) -> Option<&dyn Extractor> {
        Some(self)
    }
}

/// First object of an odds response: `{"data": [...]}`, a bare array, or the object itself.
fn first_odds_document(body: Value) -> Record {
    let first = match body {
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items.into_iter().next(),
            Some(other) => {
                obj.insert("data".to_string(), other);
                Some(Value::Object(obj))
            }
            None => Some(Value::Object(obj)),
        },
        Value::Array(items) => items.into_iter().next(),
        _ => None,
    };

    match first {
        Some(Value::Object(obj)) => obj,
        _ => Map::new(),
    }
}

fn unwrap_list(body: Value, key: &str) -> Vec<Record> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match (obj.remove(key), obj.remove("data")) {
            (Some(Value::Array(items)), _) => items,
            (Some(_), _) => Vec::new(),
            (None, Some(Value::Array(items))) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(obj),
            _ => None,
        })
        .collect()
}

/// Null, false, zero, and empty strings or containers count as absent.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
}

fn first_present<'a>(candidates: &[Option<&'a Value>]) -> Option<&'a Value> {
    candidates.iter().copied().find_map(present)
}

fn as_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn event_id(stub: &Record, odds: &Record) -> Option<String> {
    first_present(&[
        odds.get("id"),
        stub.get("id"),
        stub.get("event_id"),
        odds.get("event_id"),
    ])
    .map(as_id)
}

/// Maps sport keys to titles.
pub fn sports_title_map(sports: &[Record]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for sport in sports {
        let key = first_present(&[sport.get("key"), sport.get("sport_key")]);
        let title = first_present(&[sport.get("title"), sport.get("sport_title")]);
        if let (Some(Value::String(key)), Some(Value::String(title))) = (key, title) {
            map.insert(key.clone(), title.clone());
        }
    }
    map
}

/// Merges an event stub with its odds document.
///
/// Fields from the odds document win over the stub. The sport title falls
/// back to the sports map. Returns `None` when no event id can be found.
pub fn normalize_event(
    stub: &Record,
    odds: &Record,
    sports_map: &HashMap<String, String>,
    sport_key: Option<&str>,
) -> Option<Record> {
    let id = event_id(stub, odds)?;
    let pick = |field: &str| {
        first_present(&[odds.get(field), stub.get(field)])
            .cloned()
            .unwrap_or(Value::Null)
    };

    let effective_sport_key = match pick("sport_key") {
        Value::Null => sport_key.map(|k| Value::String(k.to_string())).unwrap_or(Value::Null),
        other => other,
    };
    let sport_title = match present(odds.get("sport_title")) {
        Some(title) => title.clone(),
        None => effective_sport_key
            .as_str()
            .and_then(|key| sports_map.get(key))
            .map(|title| Value::String(title.clone()))
            .unwrap_or(Value::Null),
    };
    let bookmakers = present(odds.get("bookmakers"))
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    let mut event = Map::new();
    event.insert("id".to_string(), Value::String(id));
    event.insert("sport_key".to_string(), effective_sport_key);
    event.insert("sport_title".to_string(), sport_title);
    event.insert("commence_time".to_string(), pick("commence_time"));
    event.insert("home_team".to_string(), pick("home_team"));
    event.insert("away_team".to_string(), pick("away_team"));
    event.insert("bookmakers".to_string(), bookmakers);
    Some(event)
}
