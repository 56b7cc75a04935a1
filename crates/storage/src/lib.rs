//! Persistence for enrichment row sets.
//!
//! [`TableStore`] is the seam between the pipeline and a concrete store;
//! [`TableLoader`] enforces the column contracts and the empty-batch rule on
//! top of it.

pub mod clickhouse;
pub mod loader;
pub mod sqlite;

use async_trait::async_trait;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::warn;
use url::Url;

use storescope_core::{CellValue, Table, TableSchema};

pub use clickhouse::{ClickHouseOptions, ClickHouseStore};
pub use loader::{LoadReport, TableLoader};
pub use sqlite::SqliteStore;

/// Column-oriented sink for typed rows.
///
/// Implementations must apply each `append` call atomically: either every row
/// of the call becomes visible or none does.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Returns the store's columns for `table` in declaration order, or an
    /// empty list when the table does not exist.
    async fn columns(&self, table: Table) -> Result<Vec<String>, StoreError>;

    /// Appends `rows` to the table described by `schema` in one batch.
    async fn append(&self, schema: &TableSchema, rows: &[Vec<CellValue>])
        -> Result<(), StoreError>;
}

/// Errors raised by [`TableStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table {table} does not match its column contract: {detail}")]
    SchemaMismatch { table: String, detail: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected rows for {table}: {message}")]
    Rejected { table: String, message: String },
}

impl StoreError {
    /// Returns `true` when the error means the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Errors that can occur while opening a store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("unsupported store url '{0}'")]
    UnsupportedUrl(String),
    #[error("invalid store url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Options shared by every store backend.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub bootstrap: bool,
    pub clickhouse: ClickHouseOptions,
}

/// Store handle selected from the configured URL.
#[derive(Clone)]
pub enum AnyStore {
    Sqlite(SqliteStore),
    ClickHouse(ClickHouseStore),
}

impl AnyStore {
    /// Opens the store behind `url`: `sqlite:` URLs use SQLite, `http://` URLs
    /// use the ClickHouse HTTP interface.
    pub async fn connect(url: &str, options: &StoreOptions) -> Result<Self, StorageError> {
        if url.starts_with("sqlite:") {
            let store = SqliteStore::connect(url, options.max_connections).await?;
            if options.bootstrap {
                store.bootstrap().await?;
            }
            return Ok(Self::Sqlite(store));
        }

        if url.starts_with("http://") {
            if options.bootstrap {
                warn!(stage = "load", "bootstrap is only supported for sqlite stores; skipping");
            }
            let store = ClickHouseStore::new(&Url::parse(url)?, &options.clickhouse);
            return Ok(Self::ClickHouse(store));
        }

        Err(StorageError::UnsupportedUrl(url.to_string()))
    }

    /// Returns the backend name for logging.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::ClickHouse(_) => "clickhouse",
        }
    }

    /// Releases pooled connections.
    pub async fn close(&self) {
        match self {
            Self::Sqlite(store) => store.close().await,
            Self::ClickHouse(_) => {}
        }
    }
}

#[async_trait]
impl TableStore for AnyStore {
    async fn columns(&self, table: Table) -> Result<Vec<String>, StoreError> {
        match self {
            Self::Sqlite(store) => store.columns(table).await,
            Self::ClickHouse(store) => store.columns(table).await,
        }
    }

    async fn append(
        &self,
        schema: &TableSchema,
        rows: &[Vec<CellValue>],
    ) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(store) => store.append(schema, rows).await,
            Self::ClickHouse(store) => store.append(schema, rows).await,
        }
    }
}
