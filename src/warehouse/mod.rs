// src/warehouse/mod.rs
//! Persistence for normalized records plus the fixed SQL that builds the
//! trusted and refined views over the raw tables.

pub mod bigquery;
pub mod local;
pub mod views;

use anyhow::Result;

use crate::normalize::MetricRecord;

pub use self::bigquery::BigQueryWarehouse;
pub use self::local::ParquetWarehouse;

/// One column of the raw table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawField {
    pub name: &'static str,
    /// BigQuery type name.
    pub ty: &'static str,
    pub required: bool,
}

pub const RAW_SCHEMA: &[RawField] = &[
    RawField {
        name: "period",
        ty: "STRING",
        required: true,
    },
    RawField {
        name: "index_value",
        ty: "FLOAT64",
        required: false,
    },
    RawField {
        name: "month_change",
        ty: "FLOAT64",
        required: false,
    },
    RawField {
        name: "year_change",
        ty: "FLOAT64",
        required: false,
    },
    RawField {
        name: "loaded_at",
        ty: "TIMESTAMP",
        required: true,
    },
];

/// Destination for raw records and the SQL run over them.
#[allow(async_fn_in_trait)]
pub trait Warehouse {
    /// Drop `table` if present and create it empty with [`RAW_SCHEMA`].
    async fn recreate_raw_table(&self, table: &str) -> Result<()>;

    /// Append `records` to `table`, returning the number of rows written.
    /// Rows are not deduplicated against earlier appends.
    async fn append(&self, table: &str, records: &[MetricRecord]) -> Result<usize>;

    /// Run one fixed SQL statement.
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// The warehouse chosen by configuration.
pub enum AnyWarehouse {
    BigQuery(BigQueryWarehouse),
    Parquet(ParquetWarehouse),
}

impl Warehouse for AnyWarehouse {
    async fn recreate_raw_table(&self, table: &str) -> Result<()> {
        match self {
            AnyWarehouse::BigQuery(w) => w.recreate_raw_table(table).await,
            AnyWarehouse::Parquet(w) => w.recreate_raw_table(table).await,
        }
    }

    async fn append(&self, table: &str, records: &[MetricRecord]) -> Result<usize> {
        match self {
            AnyWarehouse::BigQuery(w) => w.append(table, records).await,
            AnyWarehouse::Parquet(w) => w.append(table, records).await,
        }
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        match self {
            AnyWarehouse::BigQuery(w) => w.execute(sql).await,
            AnyWarehouse::Parquet(w) => w.execute(sql).await,
        }
    }
}
