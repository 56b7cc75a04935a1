//! Domain layer for the storefront enrichment pipeline.
//!
//! Everything in this crate is pure: raw analytics documents come in, typed
//! snapshots and per-table row sets come out. Persistence and transport live
//! in the `storage` and `remote` crates.

pub mod parser;
pub mod records;
pub mod schema;
pub mod snapshot;
pub mod transformer;

pub use parser::{ParseError, SnapshotParser};
pub use records::{
    CountryShareRecord, DomainStatsRecord, KeywordRecord, RecordBatch, TableRow,
    TrafficSourceRecord,
};
pub use schema::{CellValue, Table, TableSchema, VisitWindow, VisitWindowError};
pub use snapshot::{
    CountryShare, Engagement, KeywordEntry, RawSnapshot, TrafficChannel, TypedSnapshot,
};
pub use transformer::RecordTransformer;
