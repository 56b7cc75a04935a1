use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{
    query_builder::Separated,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    QueryBuilder, Sqlite, SqlitePool,
};

use storescope_core::{CellValue, Table, TableSchema};

use crate::{StorageError, StoreError, TableStore};

/// SQLite's default upper bound on bound parameters per statement.
const MAX_BIND_PARAMS: usize = 32_766;

/// [`TableStore`] backed by a SQLite connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens a pool with at most `max_connections` connections.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Creates the enrichment tables in a fresh database.
    pub async fn bootstrap(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TableStore for SqliteStore {
    async fn columns(&self, table: Table) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(table.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|err| classify(table.as_str(), err))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn append(
        &self,
        schema: &TableSchema,
        rows: &[Vec<CellValue>],
    ) -> Result<(), StoreError> {
        let table = schema.name();
        let columns = schema.columns();
        let rows_per_statement = (MAX_BIND_PARAMS / columns.len().max(1)).max(1);
        let insert_head = format!(
            "INSERT INTO \"{table}\" ({}) ",
            columns
                .iter()
                .map(|column| format!("\"{column}\""))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| classify(table, err))?;

        for chunk in rows.chunks(rows_per_statement) {
            let mut builder = QueryBuilder::<Sqlite>::new(insert_head.as_str());
            builder.push_values(chunk, |mut row, cells| {
                for cell in cells {
                    push_cell(&mut row, cell);
                }
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|err| classify(table, err))?;
        }

        tx.commit().await.map_err(|err| classify(table, err))
    }
}

fn push_cell<'args>(row: &mut Separated<'_, 'args, Sqlite, &'static str>, cell: &CellValue) {
    match cell {
        CellValue::Text(value) => {
            row.push_bind(value.clone());
        }
        CellValue::Int(value) => {
            row.push_bind(*value);
        }
        CellValue::Float(value) => {
            row.push_bind(*value);
        }
        CellValue::Bool(value) => {
            row.push_bind(*value);
        }
        CellValue::DateTime(value) => {
            row.push_bind(*value);
        }
        CellValue::NullableInt(value) => {
            row.push_bind(*value);
        }
        CellValue::NullableText(value) => {
            row.push_bind(value.clone());
        }
    }
}

fn classify(table: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            if message.contains("no such table")
                || message.contains("has no column named")
                || message.contains("no such column")
            {
                StoreError::SchemaMismatch {
                    table: table.to_string(),
                    detail: message,
                }
            } else {
                StoreError::Rejected {
                    table: table.to_string(),
                    message,
                }
            }
        }
        err @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => StoreError::Unavailable(err.to_string()),
        other => StoreError::Rejected {
            table: table.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use storescope_core::VisitWindow;

    async fn setup_store() -> SqliteStore {
        let store = SqliteStore::connect("sqlite::memory:", 1)
            .await
            .expect("connect");
        store.bootstrap().await.expect("bootstrap");
        store
    }

    fn keyword_row(keyword: &str, cpc: f64) -> Vec<CellValue> {
        vec![
            CellValue::Text("shop.example".to_string()),
            CellValue::DateTime(
                NaiveDate::from_ymd_opt(2024, 11, 1)
                    .expect("date")
                    .and_hms_opt(0, 0, 0)
                    .expect("time"),
            ),
            CellValue::Text(keyword.to_string()),
            CellValue::Float(10.0),
            CellValue::Int(100),
            CellValue::Float(cpc),
        ]
    }

    #[tokio::test]
    async fn bootstrap_matches_default_contracts() {
        let store = setup_store().await;
        let window = VisitWindow::default();
        for table in Table::ALL {
            let columns = store.columns(table).await.expect("columns");
            assert_eq!(
                columns,
                TableSchema::for_table(table, &window).columns(),
                "table {table}"
            );
        }
    }

    #[tokio::test]
    async fn missing_table_reports_no_columns() {
        let store = SqliteStore::connect("sqlite::memory:", 1)
            .await
            .expect("connect");
        let columns = store.columns(Table::TopKeywords).await.expect("columns");
        assert!(columns.is_empty());
    }

    #[tokio::test]
    async fn append_writes_rows_in_order() {
        let store = setup_store().await;
        let schema = TableSchema::for_table(Table::TopKeywords, &VisitWindow::default());

        store
            .append(&schema, &[keyword_row("b", 0.5), keyword_row("a", 0.0)])
            .await
            .expect("append");

        let rows: Vec<(String, f64, String)> =
            sqlx::query_as("SELECT keyword, cpc, snapshot_date FROM top_keywords ORDER BY rowid")
                .fetch_all(store.pool())
                .await
                .expect("select");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "b");
        assert_eq!(rows[0].1, 0.5);
        assert_eq!(rows[1].0, "a");
        assert!(rows[0].2.starts_with("2024-11-01 00:00:00"));
    }

    #[tokio::test]
    async fn nullable_cells_are_stored_as_null() {
        let store = setup_store().await;
        let window = VisitWindow::default();
        let schema = TableSchema::for_table(Table::DomainStats, &window);
        let mut row = vec![
            CellValue::Text("shop.example".into()),
            CellValue::Text(String::new()),
            CellValue::Text(String::new()),
            CellValue::Text(String::new()),
            CellValue::Bool(true),
            CellValue::DateTime(
                NaiveDate::from_ymd_opt(2024, 11, 1)
                    .expect("date")
                    .and_hms_opt(0, 0, 0)
                    .expect("time"),
            ),
        ];
        row.extend([CellValue::Float(0.0), CellValue::Float(0.0), CellValue::Int(0)]);
        row.extend([CellValue::Float(0.0), CellValue::Int(0), CellValue::Int(0)]);
        row.extend([CellValue::Int(1), CellValue::Int(2), CellValue::Int(3)]);
        row.extend([
            CellValue::NullableInt(None),
            CellValue::NullableInt(Some(7)),
            CellValue::NullableText(None),
            CellValue::NullableInt(None),
        ]);

        store.append(&schema, &[row]).await.expect("append");

        let (is_small, global_rank, country_rank, country_code): (
            i64,
            Option<i64>,
            Option<i64>,
            Option<String>,
        ) = sqlx::query_as(
            "SELECT is_small, global_rank, country_rank, country_code FROM domain_stats",
        )
        .fetch_one(store.pool())
        .await
        .expect("select");
        assert_eq!(is_small, 1);
        assert_eq!(global_rank, None);
        assert_eq!(country_rank, Some(7));
        assert_eq!(country_code, None);
    }

    #[tokio::test]
    async fn unknown_column_is_a_schema_mismatch() {
        let store = setup_store().await;
        sqlx::query("DROP TABLE top_keywords")
            .execute(store.pool())
            .await
            .expect("drop");
        sqlx::query("CREATE TABLE top_keywords (site_name TEXT, snapshot_date TEXT)")
            .execute(store.pool())
            .await
            .expect("create");

        let schema = TableSchema::for_table(Table::TopKeywords, &VisitWindow::default());
        let err = store
            .append(&schema, &[keyword_row("a", 1.0)])
            .await
            .expect_err("mismatch");
        assert!(matches!(err, StoreError::SchemaMismatch { ref table, .. } if table == "top_keywords"));
    }

    #[tokio::test]
    async fn failed_row_rolls_back_its_statement() {
        let store = setup_store().await;
        let schema = TableSchema::for_table(Table::TopKeywords, &VisitWindow::default());
        let mut bad = keyword_row("bad", 1.0);
        bad[2] = CellValue::NullableText(None);

        let err = store
            .append(&schema, &[keyword_row("good", 1.0), bad])
            .await
            .expect_err("NOT NULL violation");
        assert!(matches!(err, StoreError::Rejected { .. }));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM top_keywords")
            .fetch_one(store.pool())
            .await
            .expect("count");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn failure_in_a_later_chunk_rolls_back_earlier_chunks() {
        let store = setup_store().await;
        let schema = TableSchema::for_table(Table::TopKeywords, &VisitWindow::default());
        let rows_per_statement = MAX_BIND_PARAMS / schema.columns().len();

        let mut rows: Vec<_> = (0..rows_per_statement)
            .map(|idx| keyword_row(&format!("kw{idx}"), 1.0))
            .collect();
        let mut bad = keyword_row("bad", 1.0);
        bad[2] = CellValue::NullableText(None);
        rows.push(bad);
        assert_eq!(rows.chunks(rows_per_statement).count(), 2);

        let err = store
            .append(&schema, &rows)
            .await
            .expect_err("NOT NULL violation in second chunk");
        assert!(matches!(err, StoreError::Rejected { .. }));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM top_keywords")
            .fetch_one(store.pool())
            .await
            .expect("count");
        assert_eq!(count, 0);
    }
}
