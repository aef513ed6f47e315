// src/config.rs
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf, time::Duration};
use tracing::info;

use crate::{
    fetch::DownloadSettings,
    normalize::DecimalMark,
    warehouse::{AnyWarehouse, BigQueryWarehouse, ParquetWarehouse},
};

pub const CONFIG_ENV: &str = "INDEXSCRAPER_CONFIG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseKind {
    #[default]
    Bigquery,
    Parquet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub kind: WarehouseKind,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub access_token: Option<String>,
    pub parquet_dir: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            kind: WarehouseKind::default(),
            project: None,
            dataset: None,
            access_token: None,
            parquet_dir: PathBuf::from("warehouse"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub download_dir: PathBuf,
    pub output_dir: PathBuf,
    pub download_wait_secs: u64,
    pub poll_interval_ms: u64,
    pub page_retries: u32,
    /// Per-request ceiling for every HTTP call, warehouse included.
    pub http_timeout_secs: u64,
    pub decimal_mark: DecimalMark,
    /// Physical rows discarded before the sheet reaches the normalizer.
    pub skip_leading_rows: usize,
    pub warehouse: WarehouseConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let dl = DownloadSettings::default();
        Self {
            download_dir: dl.download_dir,
            output_dir: dl.output_dir,
            download_wait_secs: dl.wait.as_secs(),
            poll_interval_ms: dl.poll.as_millis() as u64,
            page_retries: dl.page_retries,
            http_timeout_secs: 60,
            decimal_mark: DecimalMark::default(),
            skip_leading_rows: 0,
            warehouse: WarehouseConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing pipeline config")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&text)
    }

    /// Config from `path`, else from `$INDEXSCRAPER_CONFIG`, else defaults;
    /// then environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
        let mut cfg = match path {
            Some(p) => {
                info!(path = %p.display(), "loading config");
                Self::from_file(p)?
            }
            None => {
                info!("no config file; using defaults");
                Self::default()
            }
        };
        cfg.apply_overrides(|k| env::var(k).ok());
        Ok(cfg)
    }

    /// Apply `BIGQUERY_*` overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("BIGQUERY_PROJECT") {
            self.warehouse.project = Some(v);
        }
        if let Some(v) = get("BIGQUERY_DATASET") {
            self.warehouse.dataset = Some(v);
        }
        if let Some(v) = get("BIGQUERY_ACCESS_TOKEN") {
            self.warehouse.access_token = Some(v);
        }
    }

    pub fn download_settings(&self) -> DownloadSettings {
        DownloadSettings {
            download_dir: self.download_dir.clone(),
            output_dir: self.output_dir.clone(),
            wait: Duration::from_secs(self.download_wait_secs),
            poll: Duration::from_millis(self.poll_interval_ms.max(1)),
            page_retries: self.page_retries,
            ..DownloadSettings::default()
        }
    }

    pub fn http_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs.max(1)))
            .build()
            .context("building HTTP client")
    }

    /// Project and dataset the SQL templates are rendered with.
    pub fn sql_target(&self) -> (String, String) {
        let w = &self.warehouse;
        (
            w.project.clone().unwrap_or_else(|| "local".to_string()),
            w.dataset.clone().unwrap_or_else(|| "indices".to_string()),
        )
    }

    pub fn build_warehouse(&self, client: &Client) -> Result<AnyWarehouse> {
        let w = &self.warehouse;
        match w.kind {
            WarehouseKind::Bigquery => {
                let (Some(project), Some(dataset)) = (&w.project, &w.dataset) else {
                    bail!("bigquery warehouse needs a project and a dataset (BIGQUERY_PROJECT, BIGQUERY_DATASET)");
                };
                Ok(AnyWarehouse::BigQuery(BigQueryWarehouse::new(
                    client.clone(),
                    project,
                    dataset,
                    w.access_token.clone(),
                )))
            }
            WarehouseKind::Parquet => Ok(AnyWarehouse::Parquet(ParquetWarehouse::new(
                &w.parquet_dir,
            )?)),
        }
    }
}
