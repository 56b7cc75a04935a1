use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Untyped analytics document as returned by the remote provider.
pub type RawSnapshot = Value;

/// Fully defaulted view of one analytics document.
///
/// Every field except the rank fields carries a concrete value; the parser
/// fills in defaults so consumers never repeat null checks.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedSnapshot {
    pub site_name: String,
    pub description: String,
    pub title: String,
    pub category: String,
    pub is_small: bool,
    pub snapshot_date: NaiveDateTime,
    pub engagement: Engagement,
    /// Estimated visits keyed by the first day of the month.
    pub monthly_visits: BTreeMap<NaiveDate, i64>,
    pub global_rank: Option<i64>,
    pub country_rank: Option<i64>,
    pub country_rank_code: Option<String>,
    pub category_rank: Option<i64>,
    /// Share of traffic keyed by the provider's channel name.
    pub traffic_sources: BTreeMap<String, f64>,
    pub top_countries: Vec<CountryShare>,
    pub top_keywords: Vec<KeywordEntry>,
}

impl TypedSnapshot {
    /// Share of traffic for `channel`, zero when the provider omitted it.
    pub fn traffic_share(&self, channel: TrafficChannel) -> f64 {
        self.traffic_sources
            .get(channel.as_str())
            .copied()
            .unwrap_or_default()
    }

    /// Estimated visits for the month starting at `month`, zero when absent.
    pub fn visits_for(&self, month: NaiveDate) -> i64 {
        self.monthly_visits.get(&month).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Engagement {
    pub bounce_rate: f64,
    pub pages_per_visit: f64,
    pub visits: i64,
    pub time_on_site: f64,
    pub month: i64,
    pub year: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryShare {
    pub country_id: i64,
    pub country_code: String,
    pub share: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordEntry {
    pub name: String,
    pub estimated_value: f64,
    pub volume: i64,
    pub cpc: f64,
}

/// Traffic channels exported on `traffic_sources`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficChannel {
    Social,
    PaidReferrals,
    Mail,
    Referrals,
    Search,
    Direct,
}

impl TrafficChannel {
    /// Returns the key the provider uses in `TrafficSources`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Social => "Social",
            Self::PaidReferrals => "Paid Referrals",
            Self::Mail => "Mail",
            Self::Referrals => "Referrals",
            Self::Search => "Search",
            Self::Direct => "Direct",
        }
    }
}
