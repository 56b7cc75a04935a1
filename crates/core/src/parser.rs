use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use thiserror::Error;

use crate::snapshot::{CountryShare, Engagement, KeywordEntry, RawSnapshot, TypedSnapshot};

static NULL: Value = Value::Null;

const SNAPSHOT_DATE_FIELD: &str = "SnapshotDate";
const NAIVE_DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Errors that can occur while validating a raw analytics document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid snapshot: field '{field}' {reason}")]
    InvalidSnapshot { field: &'static str, reason: String },
}

/// Validates and coerces raw analytics documents into [`TypedSnapshot`] values.
///
/// Each field is extracted on its own with a fixed default, so a missing or
/// wrongly shaped field never affects its neighbours. Only the snapshot date is
/// mandatory because every output row is keyed by it.
pub struct SnapshotParser;

impl SnapshotParser {
    pub fn parse(raw: &RawSnapshot) -> Result<TypedSnapshot, ParseError> {
        let snapshot_date = snapshot_date(field(raw, SNAPSHOT_DATE_FIELD))?;

        let engagements = field(raw, "Engagments");
        let engagement = Engagement {
            bounce_rate: float(field(engagements, "BounceRate")),
            pages_per_visit: float(field(engagements, "PagePerVisit")),
            visits: integer(field(engagements, "Visits")),
            time_on_site: float(field(engagements, "TimeOnSite")),
            month: integer(field(engagements, "Month")),
            year: integer(field(engagements, "Year")),
        };

        let monthly_visits = entries(field(raw, "EstimatedMonthlyVisits"))
            .filter_map(|(key, value)| {
                NaiveDate::parse_from_str(key, "%Y-%m-%d")
                    .ok()
                    .map(|month| (month, integer(value)))
            })
            .collect();

        let traffic_sources = entries(field(raw, "TrafficSources"))
            .map(|(key, value)| (key.clone(), float(value)))
            .collect();

        let country_rank = field(raw, "CountryRank");

        Ok(TypedSnapshot {
            site_name: text(field(raw, "SiteName")),
            description: text(field(raw, "Description")),
            title: text(field(raw, "Title")),
            category: text(field(raw, "Category")),
            is_small: flag(field(raw, "IsSmall")),
            snapshot_date,
            engagement,
            monthly_visits,
            global_rank: rank(field(field(raw, "GlobalRank"), "Rank")),
            country_rank: rank(field(country_rank, "Rank")),
            country_rank_code: nullable_text(field(country_rank, "CountryCode")),
            category_rank: rank(field(field(raw, "CategoryRank"), "Rank")),
            traffic_sources,
            top_countries: items(field(raw, "TopCountryShares"))
                .map(|entry| CountryShare {
                    country_id: integer(field(entry, "Country")),
                    country_code: text(field(entry, "CountryCode")),
                    share: float(field(entry, "Value")),
                })
                .collect(),
            top_keywords: items(field(raw, "TopKeywords"))
                .map(|entry| KeywordEntry {
                    name: text(field(entry, "Name")),
                    estimated_value: float(field(entry, "EstimatedValue")),
                    volume: integer(field(entry, "Volume")),
                    cpc: float(field(entry, "Cpc")),
                })
                .collect(),
        })
    }
}

/// Looks up `key`, treating non-objects as empty objects.
fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
    value.get(key).unwrap_or(&NULL)
}

fn entries(value: &Value) -> impl Iterator<Item = (&String, &Value)> {
    value.as_object().into_iter().flat_map(|map| map.iter())
}

fn items(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().into_iter().flat_map(|list| list.iter())
}

fn text(value: &Value) -> String {
    value.as_str().map(str::to_owned).unwrap_or_default()
}

fn nullable_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_owned)
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(raw) => {
            let raw = raw.trim();
            raw.eq_ignore_ascii_case("true") || raw == "1"
        }
        _ => false,
    }
}

fn float(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn integer(value: &Value) -> i64 {
    match value {
        Value::Bool(flag) => i64::from(*flag),
        other => nullable_integer(other).unwrap_or(0),
    }
}

fn rank(value: &Value) -> Option<i64> {
    nullable_integer(value)
}

fn nullable_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(truncate)),
        Value::String(raw) => {
            let raw = raw.trim();
            raw.parse::<i64>()
                .ok()
                .or_else(|| raw.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn truncate(value: f64) -> Option<i64> {
    (value.is_finite() && value.abs() < i64::MAX as f64).then(|| value.trunc() as i64)
}

fn snapshot_date(value: &Value) -> Result<NaiveDateTime, ParseError> {
    let invalid = |reason: String| ParseError::InvalidSnapshot {
        field: SNAPSHOT_DATE_FIELD,
        reason,
    };

    let raw = match value {
        Value::String(raw) => raw.trim(),
        Value::Null => return Err(invalid("is missing".to_string())),
        other => return Err(invalid(format!("is not a string: {other}"))),
    };
    if raw.is_empty() {
        return Err(invalid("is empty".to_string()));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.naive_utc());
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(invalid(format!("is not a recognised date: '{raw}'")))
}
