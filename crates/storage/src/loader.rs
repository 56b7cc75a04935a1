use tracing::debug;

use storescope_core::{RecordBatch, Table, TableRow, TableSchema, VisitWindow};

use crate::{StoreError, TableStore};

/// Rows written per table by one [`TableLoader::load_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    counts: [usize; 4],
}

impl LoadReport {
    pub fn rows(&self, table: Table) -> usize {
        self.counts[table as usize]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Adds the counts of `other` to this report.
    pub fn merge(&mut self, other: &LoadReport) {
        for (total, rows) in self.counts.iter_mut().zip(other.counts) {
            *total += rows;
        }
    }

    fn record(&mut self, table: Table, rows: usize) {
        self.counts[table as usize] += rows;
    }
}

/// Writes record sets into their tables following the fixed column contracts.
///
/// Every non-empty row set is sent as a single append; empty row sets never
/// reach the store.
pub struct TableLoader<S> {
    store: S,
    schemas: [TableSchema; 4],
}

impl<S: TableStore> TableLoader<S> {
    pub fn new(store: S, window: &VisitWindow) -> Self {
        Self {
            store,
            schemas: Table::ALL.map(|table| TableSchema::for_table(table, window)),
        }
    }

    pub fn schema(&self, table: Table) -> &TableSchema {
        &self.schemas[table as usize]
    }

    /// Compares every table in the store with its column contract.
    pub async fn verify_schema(&self) -> Result<(), StoreError> {
        for schema in &self.schemas {
            let actual = self.store.columns(schema.table()).await?;
            if actual.is_empty() {
                return Err(StoreError::SchemaMismatch {
                    table: schema.name().to_string(),
                    detail: "table does not exist".to_string(),
                });
            }
            if actual != schema.columns() {
                return Err(StoreError::SchemaMismatch {
                    table: schema.name().to_string(),
                    detail: format!(
                        "expected columns [{}], found [{}]",
                        schema.columns().join(", "),
                        actual.join(", ")
                    ),
                });
            }
        }
        Ok(())
    }

    /// Appends `rows` to `R::TABLE` and returns the number of rows written.
    pub async fn load<R>(&self, rows: &[R]) -> Result<usize, StoreError>
    where
        R: TableRow + Sync,
    {
        if rows.is_empty() {
            return Ok(0);
        }

        let schema = self.schema(R::TABLE);
        let cells: Vec<_> = rows.iter().map(TableRow::cells).collect();
        if let Some(row) = cells.iter().find(|row| row.len() != schema.columns().len()) {
            return Err(StoreError::SchemaMismatch {
                table: schema.name().to_string(),
                detail: format!(
                    "record has {} values for {} columns",
                    row.len(),
                    schema.columns().len()
                ),
            });
        }

        debug!(stage = "load", table = schema.name(), rows = cells.len(), "appending rows");
        self.store.append(schema, &cells).await?;
        Ok(cells.len())
    }

    /// Loads every row set of `batch`, one append per non-empty table.
    pub async fn load_batch(&self, batch: &RecordBatch) -> Result<LoadReport, StoreError> {
        let mut report = LoadReport::default();
        report.record(
            Table::DomainStats,
            self.load(std::slice::from_ref(&batch.domain_stats)).await?,
        );
        report.record(
            Table::TrafficSources,
            self.load(std::slice::from_ref(&batch.traffic_sources)).await?,
        );
        report.record(Table::TopCountries, self.load(&batch.top_countries).await?);
        report.record(Table::TopKeywords, self.load(&batch.top_keywords).await?);
        Ok(report)
    }
}
