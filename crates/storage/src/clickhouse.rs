use async_trait::async_trait;
use clickhouse::{error::Error as ClickHouseError, sql::Identifier, Client, Compression, Row};
use serde::Deserialize;
use url::Url;

use storescope_core::{CellValue, Table, TableSchema};

use crate::{StoreError, TableStore};

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Server error codes that mean the table layout differs from ours.
const SCHEMA_ERROR_CODES: &[u32] = &[
    16, // NO_SUCH_COLUMN_IN_TABLE
    47, // UNKNOWN_IDENTIFIER
    60, // UNKNOWN_TABLE
    81, // UNKNOWN_DATABASE
];

/// Server error codes that mean the store cannot be used at all.
const UNAVAILABLE_ERROR_CODES: &[u32] = &[
    192, // UNKNOWN_USER
    193, // WRONG_PASSWORD
    497, // ACCESS_DENIED
    516, // AUTHENTICATION_FAILED
];

/// Credentials and database used for the ClickHouse HTTP interface.
#[derive(Debug, Clone)]
pub struct ClickHouseOptions {
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for ClickHouseOptions {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
        }
    }
}

/// [`TableStore`] backed by a ClickHouse server.
///
/// Each append is a single `INSERT ... VALUES` statement, which the server
/// applies as one insert block. Values are bound through the client, never
/// spliced into the statement text.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
}

impl ClickHouseStore {
    pub fn new(url: &Url, options: &ClickHouseOptions) -> Self {
        let client = Client::default()
            .with_url(url.as_str())
            .with_user(options.user.as_str())
            .with_password(options.password.as_str())
            .with_database(options.database.as_str())
            .with_compression(Compression::None);
        Self { client }
    }
}

#[derive(Debug, Row, Deserialize)]
struct ColumnRow {
    name: String,
}

#[async_trait]
impl TableStore for ClickHouseStore {
    async fn columns(&self, table: Table) -> Result<Vec<String>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT ?fields FROM system.columns \
                 WHERE database = currentDatabase() AND table = ? \
                 ORDER BY position",
            )
            .bind(table.as_str())
            .fetch_all::<ColumnRow>()
            .await
            .map_err(|err| classify(table.as_str(), err))?;

        Ok(rows.into_iter().map(|row| row.name).collect())
    }

    async fn append(
        &self,
        schema: &TableSchema,
        rows: &[Vec<CellValue>],
    ) -> Result<(), StoreError> {
        let columns = schema.columns();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let tuples = vec![format!("({placeholders})"); rows.len()].join(", ");
        let statement = format!("INSERT INTO ? ({placeholders}) VALUES {tuples}");

        let mut query = self
            .client
            .query(&statement)
            .bind(Identifier(schema.name()));
        for column in columns {
            query = query.bind(Identifier(column.as_str()));
        }
        for cell in rows.iter().flatten() {
            query = match cell {
                CellValue::Text(value) => query.bind(value.as_str()),
                CellValue::Int(value) => query.bind(*value),
                CellValue::Float(value) => query.bind(*value),
                CellValue::Bool(value) => query.bind(u8::from(*value)),
                CellValue::DateTime(value) => {
                    query.bind(value.format(DATE_TIME_FORMAT).to_string())
                }
                CellValue::NullableInt(value) => query.bind(*value),
                CellValue::NullableText(value) => query.bind(value.as_deref()),
            };
        }

        query
            .execute()
            .await
            .map_err(|err| classify(schema.name(), err))
    }
}

/// Maps a client error onto the store taxonomy using the server error code.
fn classify(table: &str, err: ClickHouseError) -> StoreError {
    match err {
        ClickHouseError::Network(_) | ClickHouseError::TimedOut => {
            StoreError::Unavailable(err.to_string())
        }
        ClickHouseError::BadResponse(message) => match server_code(&message) {
            Some(code) if SCHEMA_ERROR_CODES.contains(&code) => StoreError::SchemaMismatch {
                table: table.to_string(),
                detail: message.trim().to_string(),
            },
            Some(code) if UNAVAILABLE_ERROR_CODES.contains(&code) => {
                StoreError::Unavailable(message.trim().to_string())
            }
            _ => StoreError::Rejected {
                table: table.to_string(),
                message: message.trim().to_string(),
            },
        },
        other => StoreError::Rejected {
            table: table.to_string(),
            message: other.to_string(),
        },
    }
}

/// Extracts `N` from a `Code: N. DB::Exception: ...` response.
fn server_code(message: &str) -> Option<u32> {
    let (_, rest) = message.split_once("Code: ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
