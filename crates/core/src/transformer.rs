use crate::records::{
    CountryShareRecord, DomainStatsRecord, KeywordRecord, RecordBatch, TrafficSourceRecord,
};
use crate::schema::VisitWindow;
use crate::snapshot::{TrafficChannel, TypedSnapshot};

/// Pure mapping from a [`TypedSnapshot`] to the rows of every target table.
#[derive(Debug, Clone, Default)]
pub struct RecordTransformer {
    window: VisitWindow,
}

impl RecordTransformer {
    pub fn new(window: VisitWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &VisitWindow {
        &self.window
    }

    /// Builds the record batch for `snapshot`.
    ///
    /// Fan-out rows keep the order of the snapshot's lists.
    pub fn transform(&self, snapshot: &TypedSnapshot) -> RecordBatch {
        let site_name = &snapshot.site_name;
        let snapshot_date = snapshot.snapshot_date;
        let engagement = &snapshot.engagement;

        let domain_stats = DomainStatsRecord {
            site_name: site_name.clone(),
            description: snapshot.description.clone(),
            title: snapshot.title.clone(),
            category: snapshot.category.clone(),
            is_small: snapshot.is_small,
            snapshot_date,
            bounce_rate: engagement.bounce_rate,
            page_per_visit: engagement.pages_per_visit,
            visits: engagement.visits,
            time_on_site: engagement.time_on_site,
            month: engagement.month,
            year: engagement.year,
            monthly_visits: self.window.months().map(|month| snapshot.visits_for(month)),
            global_rank: snapshot.global_rank,
            country_rank: snapshot.country_rank,
            country_code: snapshot.country_rank_code.clone(),
            category_rank: snapshot.category_rank,
        };

        let traffic_sources = TrafficSourceRecord {
            site_name: site_name.clone(),
            snapshot_date,
            social_traffic: snapshot.traffic_share(TrafficChannel::Social),
            paid_referrals_traffic: snapshot.traffic_share(TrafficChannel::PaidReferrals),
            mail_traffic: snapshot.traffic_share(TrafficChannel::Mail),
            referrals_traffic: snapshot.traffic_share(TrafficChannel::Referrals),
            search_traffic: snapshot.traffic_share(TrafficChannel::Search),
            direct_traffic: snapshot.traffic_share(TrafficChannel::Direct),
        };

        let top_countries = snapshot
            .top_countries
            .iter()
            .map(|country| CountryShareRecord {
                site_name: site_name.clone(),
                snapshot_date,
                country_code: country.country_code.clone(),
                country_id: country.country_id,
                country_share: country.share,
            })
            .collect();

        let top_keywords = snapshot
            .top_keywords
            .iter()
            .map(|keyword| KeywordRecord {
                site_name: site_name.clone(),
                snapshot_date,
                keyword: keyword.name.clone(),
                estimated_value: keyword.estimated_value,
                volume: keyword.volume,
                cpc: keyword.cpc,
            })
            .collect();

        RecordBatch {
            domain_stats,
            traffic_sources,
            top_countries,
            top_keywords,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SnapshotParser;
    use crate::records::TableRow;
    use crate::schema::{CellValue, Table, TableSchema};
    use serde_json::{json, Value};

    fn snapshot(document: Value) -> TypedSnapshot {
        SnapshotParser::parse(&document).expect("parse")
    }

    fn document() -> Value {
        json!({
            "SiteName": "shop.example",
            "SnapshotDate": "2024-11-01T00:00:00",
            "IsSmall": true,
            "Engagments": { "BounceRate": 0.5, "Visits": 900, "Month": 10, "Year": 2024 },
            "EstimatedMonthlyVisits": { "2024-08-01": 100, "2024-10-01": 300, "2024-11-01": 400 },
            "GlobalRank": { "Rank": 1000 },
            "TrafficSources": { "Search": 0.6, "Paid Referrals": 0.1 },
            "TopCountryShares": [
                { "Country": 36, "CountryCode": "AU", "Value": 0.05 },
                { "Country": 840, "CountryCode": "US", "Value": 0.7 },
                { "Country": 124, "CountryCode": "CA", "Value": 0.25 }
            ],
            "TopKeywords": [
                { "Name": "zebra", "EstimatedValue": 1.0, "Volume": 10, "Cpc": 0.3 },
                { "Name": "apple", "EstimatedValue": 9.0, "Volume": 90 }
            ]
        })
    }

    #[test]
    fn transform_is_deterministic() {
        let transformer = RecordTransformer::default();
        let snapshot = snapshot(document());
        let first = transformer.transform(&snapshot);
        let second = transformer.transform(&snapshot);
        assert_eq!(first, second);
        assert_eq!(first.domain_stats.cells(), second.domain_stats.cells());
    }

    #[test]
    fn fan_out_rows_keep_input_order() {
        let batch = RecordTransformer::default().transform(&snapshot(document()));

        let codes: Vec<_> = batch
            .top_countries
            .iter()
            .map(|row| row.country_code.as_str())
            .collect();
        assert_eq!(codes, ["AU", "US", "CA"]);

        let keywords: Vec<_> = batch
            .top_keywords
            .iter()
            .map(|row| row.keyword.as_str())
            .collect();
        assert_eq!(keywords, ["zebra", "apple"]);
        assert_eq!(batch.row_count(), 7);
    }

    #[test]
    fn every_row_carries_the_join_key() {
        let batch = RecordTransformer::default().transform(&snapshot(document()));
        let date = batch.domain_stats.snapshot_date;

        assert_eq!(batch.traffic_sources.site_name, "shop.example");
        assert_eq!(batch.traffic_sources.snapshot_date, date);
        assert!(batch
            .top_countries
            .iter()
            .all(|row| row.site_name == "shop.example" && row.snapshot_date == date));
        assert!(batch
            .top_keywords
            .iter()
            .all(|row| row.site_name == "shop.example" && row.snapshot_date == date));
    }

    #[test]
    fn selects_visit_window_months_and_defaults_missing_ones() {
        let batch = RecordTransformer::default().transform(&snapshot(document()));
        assert_eq!(batch.domain_stats.monthly_visits, [100, 0, 300]);

        let shifted = RecordTransformer::new(
            VisitWindow::new([(2024, 9), (2024, 10), (2024, 11)]).expect("window"),
        )
        .transform(&snapshot(document()));
        assert_eq!(shifted.domain_stats.monthly_visits, [0, 300, 400]);
    }

    #[test]
    fn numeric_fields_default_to_zero_and_ranks_stay_null() {
        let batch = RecordTransformer::default()
            .transform(&snapshot(json!({ "SnapshotDate": "2024-11-01" })));

        let stats = &batch.domain_stats;
        assert_eq!(stats.bounce_rate, 0.0);
        assert_eq!(stats.visits, 0);
        assert_eq!(stats.monthly_visits, [0, 0, 0]);
        assert_eq!(stats.global_rank, None);
        assert_eq!(stats.country_rank, None);
        assert_eq!(stats.country_code, None);
        assert_eq!(stats.category_rank, None);

        let traffic = &batch.traffic_sources;
        assert_eq!(traffic.social_traffic, 0.0);
        assert_eq!(traffic.direct_traffic, 0.0);
        assert!(batch.top_countries.is_empty());
        assert!(batch.top_keywords.is_empty());
    }

    #[test]
    fn missing_keyword_cpc_becomes_zero() {
        let batch = RecordTransformer::default().transform(&snapshot(document()));
        assert_eq!(batch.top_keywords[0].cpc, 0.3);
        assert_eq!(batch.top_keywords[1].cpc, 0.0);
    }

    #[test]
    fn traffic_channels_map_to_named_columns() {
        let batch = RecordTransformer::default().transform(&snapshot(document()));
        assert_eq!(batch.traffic_sources.search_traffic, 0.6);
        assert_eq!(batch.traffic_sources.paid_referrals_traffic, 0.1);
        assert_eq!(batch.traffic_sources.mail_traffic, 0.0);
    }

    #[test]
    fn cells_line_up_with_table_contracts() {
        let window = VisitWindow::default();
        let batch = RecordTransformer::new(window.clone()).transform(&snapshot(document()));

        let stats_cells = batch.domain_stats.cells();
        assert_eq!(
            stats_cells.len(),
            TableSchema::for_table(Table::DomainStats, &window).columns().len()
        );
        assert_eq!(stats_cells[4], CellValue::Bool(true));
        assert_eq!(stats_cells[15], CellValue::NullableInt(Some(1000)));
        assert!(stats_cells[16].is_null());

        assert_eq!(
            batch.traffic_sources.cells().len(),
            TableSchema::for_table(Table::TrafficSources, &window).columns().len()
        );
        assert_eq!(
            batch.top_countries[0].cells().len(),
            TableSchema::for_table(Table::TopCountries, &window).columns().len()
        );
        assert_eq!(
            batch.top_keywords[0].cells().len(),
            TableSchema::for_table(Table::TopKeywords, &window).columns().len()
        );
    }
}
