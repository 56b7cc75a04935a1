use chrono::NaiveDateTime;

use crate::schema::{CellValue, Table, VISIT_WINDOW_MONTHS};

/// A record that maps onto one row of a store table.
///
/// `cells` must follow the column order of the table's
/// [`TableSchema`](crate::schema::TableSchema).
pub trait TableRow {
    const TABLE: Table;

    fn cells(&self) -> Vec<CellValue>;
}

/// One row of `domain_stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStatsRecord {
    pub site_name: String,
    pub description: String,
    pub title: String,
    pub category: String,
    pub is_small: bool,
    pub snapshot_date: NaiveDateTime,
    pub bounce_rate: f64,
    pub page_per_visit: f64,
    pub visits: i64,
    pub time_on_site: f64,
    pub month: i64,
    pub year: i64,
    /// Visits for each month of the configured visit window.
    pub monthly_visits: [i64; VISIT_WINDOW_MONTHS],
    pub global_rank: Option<i64>,
    pub country_rank: Option<i64>,
    pub country_code: Option<String>,
    pub category_rank: Option<i64>,
}

impl TableRow for DomainStatsRecord {
    const TABLE: Table = Table::DomainStats;

    fn cells(&self) -> Vec<CellValue> {
        let mut cells = vec![
            CellValue::Text(self.site_name.clone()),
            CellValue::Text(self.description.clone()),
            CellValue::Text(self.title.clone()),
            CellValue::Text(self.category.clone()),
            CellValue::Bool(self.is_small),
            CellValue::DateTime(self.snapshot_date),
            CellValue::Float(self.bounce_rate),
            CellValue::Float(self.page_per_visit),
            CellValue::Int(self.visits),
            CellValue::Float(self.time_on_site),
            CellValue::Int(self.month),
            CellValue::Int(self.year),
        ];
        cells.extend(self.monthly_visits.iter().copied().map(CellValue::Int));
        cells.extend([
            CellValue::NullableInt(self.global_rank),
            CellValue::NullableInt(self.country_rank),
            CellValue::NullableText(self.country_code.clone()),
            CellValue::NullableInt(self.category_rank),
        ]);
        cells
    }
}

/// One row of `traffic_sources`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSourceRecord {
    pub site_name: String,
    pub snapshot_date: NaiveDateTime,
    pub social_traffic: f64,
    pub paid_referrals_traffic: f64,
    pub mail_traffic: f64,
    pub referrals_traffic: f64,
    pub search_traffic: f64,
    pub direct_traffic: f64,
}

impl TableRow for TrafficSourceRecord {
    const TABLE: Table = Table::TrafficSources;

    fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Text(self.site_name.clone()),
            CellValue::DateTime(self.snapshot_date),
            CellValue::Float(self.social_traffic),
            CellValue::Float(self.paid_referrals_traffic),
            CellValue::Float(self.mail_traffic),
            CellValue::Float(self.referrals_traffic),
            CellValue::Float(self.search_traffic),
            CellValue::Float(self.direct_traffic),
        ]
    }
}

/// One row of `top_countries`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryShareRecord {
    pub site_name: String,
    pub snapshot_date: NaiveDateTime,
    pub country_code: String,
    pub country_id: i64,
    pub country_share: f64,
}

impl TableRow for CountryShareRecord {
    const TABLE: Table = Table::TopCountries;

    fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Text(self.site_name.clone()),
            CellValue::DateTime(self.snapshot_date),
            CellValue::Text(self.country_code.clone()),
            CellValue::Int(self.country_id),
            CellValue::Float(self.country_share),
        ]
    }
}

/// One row of `top_keywords`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRecord {
    pub site_name: String,
    pub snapshot_date: NaiveDateTime,
    pub keyword: String,
    pub estimated_value: f64,
    pub volume: i64,
    pub cpc: f64,
}

impl TableRow for KeywordRecord {
    const TABLE: Table = Table::TopKeywords;

    fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Text(self.site_name.clone()),
            CellValue::DateTime(self.snapshot_date),
            CellValue::Text(self.keyword.clone()),
            CellValue::Float(self.estimated_value),
            CellValue::Int(self.volume),
            CellValue::Float(self.cpc),
        ]
    }
}

/// All rows derived from a single snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub domain_stats: DomainStatsRecord,
    pub traffic_sources: TrafficSourceRecord,
    pub top_countries: Vec<CountryShareRecord>,
    pub top_keywords: Vec<KeywordRecord>,
}

impl RecordBatch {
    pub fn row_count(&self) -> usize {
        2 + self.top_countries.len() + self.top_keywords.len()
    }
}
