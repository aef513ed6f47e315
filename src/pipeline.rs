// src/pipeline.rs
use anyhow::{Context, Result};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, instrument, warn};

use crate::{
    config::PipelineConfig,
    family::MetricFamily,
    fetch::{download_all, Downloader},
    normalize::{RawSheet, TableNormalizer, TracingEvents},
    warehouse::{views::materialization_sql, Warehouse},
    xlsx,
};

/// Rows appended per family in one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub loaded: Vec<(MetricFamily, usize)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.loaded.iter().map(|(_, n)| n).sum()
    }
}

pub fn read_sheet(path: &Path, skip_leading_rows: usize) -> Result<RawSheet> {
    Ok(xlsx::read_first_sheet(path)?.skip_leading_rows(skip_leading_rows))
}

/// Normalize one downloaded file and append it to the family's raw table.
/// An empty extraction is skipped with a warning.
#[instrument(level = "info", skip(warehouse, normalizer, path), fields(path = %path.display()))]
pub async fn load_family<W: Warehouse>(
    warehouse: &W,
    normalizer: &TableNormalizer,
    family: MetricFamily,
    path: &Path,
    skip_leading_rows: usize,
) -> Result<usize> {
    let sheet = read_sheet(path, skip_leading_rows)?;
    let normalized = normalizer.normalize(&sheet, family);
    if normalized.is_empty() {
        warn!(%family, outcome = ?normalized.outcome, "no records extracted; nothing appended");
        return Ok(0);
    }

    let table = family.raw_table();
    warehouse
        .append(&table, &normalized.records)
        .await
        .with_context(|| format!("appending {} to {}", family, table))
}

/// Run the trusted then refined statements.
pub async fn materialize<W: Warehouse>(warehouse: &W, project: &str, dataset: &str) -> Result<()> {
    for stmt in materialization_sql(project, dataset) {
        info!(statement = stmt.name, "executing");
        warehouse
            .execute(&stmt.sql)
            .await
            .with_context(|| format!("executing {} statement", stmt.name))?;
    }
    Ok(())
}

/// Everything after acquisition: recreate the raw tables, load each file,
/// then materialize the views.
pub async fn load_and_materialize<W: Warehouse>(
    warehouse: &W,
    normalizer: &TableNormalizer,
    files: &[(MetricFamily, PathBuf)],
    cfg: &PipelineConfig,
) -> Result<RunSummary> {
    for (family, _) in files {
        warehouse
            .recreate_raw_table(&family.raw_table())
            .await
            .with_context(|| format!("recreating {}", family.raw_table()))?;
    }

    let mut summary = RunSummary::default();
    for (family, path) in files {
        let n = load_family(warehouse, normalizer, *family, path, cfg.skip_leading_rows).await?;
        info!(%family, rows = n, "family loaded");
        summary.loaded.push((*family, n));
    }

    let (project, dataset) = cfg.sql_target();
    materialize(warehouse, &project, &dataset).await?;
    Ok(summary)
}

/// Download both spreadsheets and load them. Any failure ends the run.
pub async fn run(cfg: &PipelineConfig) -> Result<RunSummary> {
    let client = cfg.http_client()?;
    let warehouse = cfg.build_warehouse(&client)?;
    let normalizer = TableNormalizer::new(cfg.decimal_mark, Arc::new(TracingEvents));

    let downloader = Downloader::new(client, cfg.download_settings());
    let files = download_all(&downloader, &MetricFamily::ALL)
        .await
        .context("acquiring spreadsheets")?;

    let summary = load_and_materialize(&warehouse, &normalizer, &files, cfg).await?;
    info!(rows = summary.total(), "pipeline finished");
    Ok(summary)
}
