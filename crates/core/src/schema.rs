use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Number of calendar months exported as `visits_<mon>_<yyyy>` columns.
pub const VISIT_WINDOW_MONTHS: usize = 3;

const DOMAIN_STATS_HEAD: &[&str] = &[
    "site_name",
    "description",
    "title",
    "category",
    "is_small",
    "snapshot_date",
    "bounce_rate",
    "page_per_visit",
    "visits",
    "time_on_site",
    "month",
    "year",
];

const DOMAIN_STATS_TAIL: &[&str] = &["global_rank", "country_rank", "country_code", "category_rank"];

const TRAFFIC_SOURCES_COLUMNS: &[&str] = &[
    "site_name",
    "snapshot_date",
    "social_traffic",
    "paid_referrals_traffic",
    "mail_traffic",
    "referrals_traffic",
    "search_traffic",
    "direct_traffic",
];

const TOP_COUNTRIES_COLUMNS: &[&str] = &[
    "site_name",
    "snapshot_date",
    "country_code",
    "country_id",
    "country_share",
];

const TOP_KEYWORDS_COLUMNS: &[&str] = &[
    "site_name",
    "snapshot_date",
    "keyword",
    "estimated_value",
    "volume",
    "cpc",
];

/// Target tables of the analytics store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    DomainStats,
    TrafficSources,
    TopCountries,
    TopKeywords,
}

impl Table {
    /// Every table in load order.
    pub const ALL: [Table; 4] = [
        Table::DomainStats,
        Table::TrafficSources,
        Table::TopCountries,
        Table::TopKeywords,
    ];

    /// Returns the table name used by the store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DomainStats => "domain_stats",
            Self::TrafficSources => "traffic_sources",
            Self::TopCountries => "top_countries",
            Self::TopKeywords => "top_keywords",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The calendar months whose estimated visits are exported on `domain_stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitWindow {
    months: [NaiveDate; VISIT_WINDOW_MONTHS],
}

impl VisitWindow {
    /// Builds a window from `(year, month)` pairs.
    pub fn new(months: [(i32, u32); VISIT_WINDOW_MONTHS]) -> Result<Self, VisitWindowError> {
        let mut dates = [NaiveDate::MIN; VISIT_WINDOW_MONTHS];
        for (slot, (year, month)) in dates.iter_mut().zip(months) {
            *slot = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| VisitWindowError::InvalidMonth(format!("{year:04}-{month:02}")))?;
        }
        Self::from_dates(dates)
    }

    fn from_dates(months: [NaiveDate; VISIT_WINDOW_MONTHS]) -> Result<Self, VisitWindowError> {
        for (idx, month) in months.iter().enumerate() {
            if months[..idx].contains(month) {
                return Err(VisitWindowError::DuplicateMonth(month.format("%Y-%m").to_string()));
            }
        }
        Ok(Self { months })
    }

    /// First day of each exported month, in column order.
    pub fn months(&self) -> &[NaiveDate; VISIT_WINDOW_MONTHS] {
        &self.months
    }

    /// Column names such as `visits_aug_2024`, in column order.
    pub fn column_names(&self) -> Vec<String> {
        self.months
            .iter()
            .map(|month| {
                format!(
                    "visits_{}_{}",
                    month.format("%b").to_string().to_lowercase(),
                    month.year()
                )
            })
            .collect()
    }
}

impl Default for VisitWindow {
    fn default() -> Self {
        let month = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap_or(NaiveDate::MIN);
        Self {
            months: [month(8), month(9), month(10)],
        }
    }
}

impl FromStr for VisitWindow {
    type Err = VisitWindowError;

    /// Parses `YYYY-MM,YYYY-MM,YYYY-MM`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(VisitWindowError::EmptyMonth);
        }
        if parts.len() != VISIT_WINDOW_MONTHS {
            return Err(VisitWindowError::WrongLength(parts.len()));
        }

        let mut months = [NaiveDate::MIN; VISIT_WINDOW_MONTHS];
        for (slot, part) in months.iter_mut().zip(parts) {
            *slot = NaiveDate::parse_from_str(&format!("{part}-01"), "%Y-%m-%d")
                .map_err(|_| VisitWindowError::InvalidMonth(part.to_string()))?;
        }
        Self::from_dates(months)
    }
}

/// Errors produced while building a [`VisitWindow`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VisitWindowError {
    #[error("expected exactly 3 months, got {0}")]
    WrongLength(usize),
    #[error("invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),
    #[error("month {0} appears more than once")]
    DuplicateMonth(String),
    #[error("empty month entry")]
    EmptyMonth,
}

/// Ordered column contract of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table: Table,
    columns: Vec<String>,
}

impl TableSchema {
    /// Builds the column contract for `table`.
    pub fn for_table(table: Table, window: &VisitWindow) -> Self {
        let owned = |names: &[&str]| names.iter().map(|name| name.to_string()).collect();
        let columns = match table {
            Table::DomainStats => {
                let mut columns: Vec<String> = owned(DOMAIN_STATS_HEAD);
                columns.extend(window.column_names());
                columns.extend(DOMAIN_STATS_TAIL.iter().map(|name| name.to_string()));
                columns
            }
            Table::TrafficSources => owned(TRAFFIC_SOURCES_COLUMNS),
            Table::TopCountries => owned(TOP_COUNTRIES_COLUMNS),
            Table::TopKeywords => owned(TOP_KEYWORDS_COLUMNS),
        };
        Self { table, columns }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn name(&self) -> &'static str {
        self.table.as_str()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// A single typed value in a row, in the position given by its [`TableSchema`].
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    NullableInt(Option<i64>),
    NullableText(Option<String>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::NullableInt(None) | Self::NullableText(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_names_autumn_2024_columns() {
        let window = VisitWindow::default();
        assert_eq!(
            window.column_names(),
            vec!["visits_aug_2024", "visits_sep_2024", "visits_oct_2024"]
        );
    }

    #[test]
    fn parses_window_from_env_style_value() {
        let window: VisitWindow = " 2025-01, 2025-02 ,2025-03".parse().expect("window parses");
        assert_eq!(
            window.column_names(),
            vec!["visits_jan_2025", "visits_feb_2025", "visits_mar_2025"]
        );
        assert_eq!(window, VisitWindow::new([(2025, 1), (2025, 2), (2025, 3)]).expect("window"));
    }

    #[test]
    fn rejects_malformed_windows() {
        assert_eq!(
            "2024-08,2024-09".parse::<VisitWindow>(),
            Err(VisitWindowError::WrongLength(2))
        );
        assert_eq!(
            "2024-08,2024-13,2024-10".parse::<VisitWindow>(),
            Err(VisitWindowError::InvalidMonth("2024-13".to_string()))
        );
        assert_eq!(
            "2024-08,2024-08,2024-10".parse::<VisitWindow>(),
            Err(VisitWindowError::DuplicateMonth("2024-08".to_string()))
        );
    }

    #[test]
    fn blank_entries_are_not_silently_dropped() {
        for raw in ["2024-08,,2024-09,2024-10", "2024-08,2024-09,2024-10,", ""] {
            assert_eq!(
                raw.parse::<VisitWindow>(),
                Err(VisitWindowError::EmptyMonth),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn domain_stats_contract_places_visit_columns_between_engagement_and_ranks() {
        let schema = TableSchema::for_table(Table::DomainStats, &VisitWindow::default());
        let columns = schema.columns();
        assert_eq!(columns.len(), 19);
        assert_eq!(columns[0], "site_name");
        assert_eq!(columns[11], "year");
        assert_eq!(columns[12], "visits_aug_2024");
        assert_eq!(columns[14], "visits_oct_2024");
        assert_eq!(columns[15], "global_rank");
        assert_eq!(columns[18], "category_rank");
    }

    #[test]
    fn fan_out_contracts_lead_with_join_key() {
        for table in [Table::TrafficSources, Table::TopCountries, Table::TopKeywords] {
            let schema = TableSchema::for_table(table, &VisitWindow::default());
            assert_eq!(&schema.columns()[..2], ["site_name", "snapshot_date"]);
        }
    }
}
