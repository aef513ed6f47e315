// src/warehouse/local.rs
use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::{DateTime, Utc};
use glob::glob;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::info;

use super::{Warehouse, RAW_SCHEMA};
use crate::normalize::MetricRecord;

/// Writes raw tables as Parquet files under `root/<table>/`.
/// SQL statements cannot run locally; they are stored under
/// `root/_statements/` for inspection.
pub struct ParquetWarehouse {
    root: PathBuf,
    seq: AtomicU64,
}

fn arrow_type(bq_type: &str) -> DataType {
    match bq_type {
        "FLOAT64" => DataType::Float64,
        "TIMESTAMP" => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        _ => DataType::Utf8,
    }
}

/// Arrow schema mirroring [`RAW_SCHEMA`].
pub fn raw_arrow_schema() -> Schema {
    Schema::new(
        RAW_SCHEMA
            .iter()
            .map(|f| Field::new(f.name, arrow_type(f.ty), !f.required))
            .collect::<Vec<_>>(),
    )
}

impl ParquetWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating warehouse directory {:?}", &root))?;
        Ok(Self {
            root,
            seq: AtomicU64::new(0),
        })
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    /// Unique, ordered file stem for this process.
    fn next_stem(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        format!("{}_{:04}", Utc::now().timestamp_micros(), n)
    }

    /// Read every row appended to `table`, in file order.
    pub fn read_table(&self, table: &str) -> Result<Vec<MetricRecord>> {
        let pattern = format!("{}/*.parquet", self.table_dir(table).display());
        let mut paths: Vec<PathBuf> = glob(&pattern)?.filter_map(Result::ok).collect();
        paths.sort();

        let mut out = Vec::new();
        for path in paths {
            let file =
                File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
                .with_batch_size(1024)
                .build()?;
            for batch in reader {
                out.extend(records_from_batch(&batch?)?);
            }
        }
        Ok(out)
    }
}

fn batch_from_records(records: &[MetricRecord]) -> Result<RecordBatch> {
    let period = StringArray::from_iter_values(records.iter().map(|r| r.period.as_str()));
    let index_value = Float64Array::from_iter_values(records.iter().map(|r| r.index_value));
    let month_change = Float64Array::from_iter_values(records.iter().map(|r| r.month_change));
    let year_change = Float64Array::from_iter_values(records.iter().map(|r| r.year_change));
    let loaded_at =
        TimestampMicrosecondArray::from_iter_values(records.iter().map(|r| r.loaded_at.timestamp_micros()))
            .with_timezone("UTC");

    let cols: Vec<ArrayRef> = vec![
        Arc::new(period),
        Arc::new(index_value),
        Arc::new(month_change),
        Arc::new(year_change),
        Arc::new(loaded_at),
    ];
    RecordBatch::try_new(Arc::new(raw_arrow_schema()), cols).context("building raw record batch")
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, idx: usize) -> Result<&'a T> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("column {} has unexpected type", RAW_SCHEMA[idx].name))
}

fn records_from_batch(batch: &RecordBatch) -> Result<Vec<MetricRecord>> {
    let period = column::<StringArray>(batch, 0)?;
    let index_value = column::<Float64Array>(batch, 1)?;
    let month_change = column::<Float64Array>(batch, 2)?;
    let year_change = column::<Float64Array>(batch, 3)?;
    let loaded_at = column::<TimestampMicrosecondArray>(batch, 4)?;

    (0..batch.num_rows())
        .map(|i| {
            let ts = DateTime::<Utc>::from_timestamp_micros(loaded_at.value(i))
                .ok_or_else(|| anyhow!("loaded_at out of range"))?;
            Ok(MetricRecord {
                period: period.value(i).to_string(),
                index_value: index_value.value(i),
                month_change: month_change.value(i),
                year_change: year_change.value(i),
                loaded_at: ts,
            })
        })
        .collect()
}

impl Warehouse for ParquetWarehouse {
    async fn recreate_raw_table(&self, table: &str) -> Result<()> {
        let dir = self.table_dir(table);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("dropping {:?}", &dir))?;
            info!(table, "dropped raw table");
        } else {
            info!(table, "raw table did not exist");
        }
        fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", &dir))?;
        info!(table, "created raw table");
        Ok(())
    }

    async fn append(&self, table: &str, records: &[MetricRecord]) -> Result<usize> {
        let dir = self.table_dir(table);
        if !dir.is_dir() {
            return Err(anyhow!("table {} does not exist", table));
        }
        let batch = batch_from_records(records)?;

        let fname = format!("{}.parquet", self.next_stem());
        let tmp = dir.join(format!("{}.tmp", fname));
        let final_path = dir.join(&fname);

        let file = File::create(&tmp).with_context(|| format!("creating {:?}", &tmp))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
            .context("creating Arrow writer")?;
        writer.write(&batch).context("writing raw batch")?;
        writer.close().context("closing raw writer")?;
        fs::rename(&tmp, &final_path)?;

        info!(table, rows = records.len(), file = %final_path.display(), "appended");
        Ok(records.len())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let dir = self.root.join("_statements");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.sql", self.next_stem()));
        fs::write(&path, sql).with_context(|| format!("writing {:?}", &path))?;
        info!(path = %path.display(), "stored statement; the local warehouse does not run SQL");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(period: &str, value: f64, month: f64) -> MetricRecord {
        MetricRecord {
            period: period.to_string(),
            index_value: value,
            month_change: month,
            year_change: -0.5,
            loaded_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_append_and_read_back() -> Result<()> {
        let tmp = tempdir()?;
        let wh = ParquetWarehouse::new(tmp.path())?;
        wh.recreate_raw_table("icc_raw").await?;

        let rows = vec![record("2024-03", 100.0, 1.2), record("2024-04", 101.5, 0.0)];
        assert_eq!(wh.append("icc_raw", &rows).await?, 2);

        assert_eq!(wh.read_table("icc_raw")?, rows);
        Ok(())
    }

    #[tokio::test]
    async fn test_appends_accumulate_until_recreated() -> Result<()> {
        let tmp = tempdir()?;
        let wh = ParquetWarehouse::new(tmp.path())?;
        wh.recreate_raw_table("icf_raw").await?;

        let rows = vec![record("2024-03", 90.0, 0.1)];
        wh.append("icf_raw", &rows).await?;
        wh.append("icf_raw", &rows).await?;
        assert_eq!(wh.read_table("icf_raw")?.len(), 2);

        wh.recreate_raw_table("icf_raw").await?;
        assert!(wh.read_table("icf_raw")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_append_to_missing_table_fails() -> Result<()> {
        let tmp = tempdir()?;
        let wh = ParquetWarehouse::new(tmp.path())?;
        assert!(wh.append("nope", &[record("2024-01", 1.0, 0.0)]).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_stores_statement() -> Result<()> {
        let tmp = tempdir()?;
        let wh = ParquetWarehouse::new(tmp.path())?;
        wh.execute("SELECT 1").await?;

        let stored: Vec<_> = glob(&format!("{}/_statements/*.sql", tmp.path().display()))?
            .filter_map(Result::ok)
            .collect();
        assert_eq!(stored.len(), 1);
        assert_eq!(fs::read_to_string(&stored[0])?, "SELECT 1");
        Ok(())
    }

    #[test]
    fn test_schema_nullability() {
        let schema = raw_arrow_schema();
        assert!(!schema.field(0).is_nullable());
        assert!(schema.field(2).is_nullable());
        assert!(!schema.field(4).is_nullable());
    }
}
