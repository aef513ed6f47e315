// src/fetch/mod.rs
//! Acquisition: find the spreadsheet link on an index page, download it into
//! a scratch directory, wait for it to settle, and move it into place.

pub mod download;
pub mod error;
pub mod page;

use reqwest::Client;
use std::{fs, path::PathBuf, time::Duration};
use tracing::{info, instrument};
use url::Url;

use crate::family::MetricFamily;

pub use error::AcquireError;

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Scratch directory; cleared before every download.
    pub download_dir: PathBuf,
    /// Where finished files end up, as `<family>.xlsx`.
    pub output_dir: PathBuf,
    /// Ceiling for the in-progress marker poll.
    pub wait: Duration,
    pub poll: Duration,
    pub page_retries: u32,
    pub page_backoff: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            output_dir: PathBuf::from("."),
            wait: Duration::from_secs(60),
            poll: Duration::from_secs(1),
            page_retries: 3,
            page_backoff: Duration::from_secs(5),
        }
    }
}

pub struct Downloader {
    client: Client,
    settings: DownloadSettings,
}

impl Downloader {
    pub fn new(client: Client, settings: DownloadSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Download the spreadsheet for `family` and return its final path.
    pub async fn download(&self, family: MetricFamily) -> Result<PathBuf, AcquireError> {
        let page = Url::parse(family.source_url())?;
        self.download_from(&page, &family.file_name()).await
    }

    #[instrument(level = "info", skip(self, page), fields(page = %page))]
    pub async fn download_from(&self, page: &Url, file_name: &str) -> Result<PathBuf, AcquireError> {
        let s = &self.settings;
        fs::create_dir_all(&s.download_dir)?;

        let link =
            page::find_download_link(&self.client, page, s.page_retries, s.page_backoff).await?;
        info!(%link, "found download link");

        download::clear_dir(&s.download_dir)?;
        let task = download::start_download(&self.client, &link, &s.download_dir, s.wait).await?;

        if let Err(e) = download::wait_for_download(&s.download_dir, s.wait, s.poll).await {
            task.abort();
            return Err(e);
        }
        let downloaded = task
            .await
            .map_err(|e| AcquireError::Task(e.to_string()))??;

        let target = s.output_dir.join(file_name);
        let final_path = download::relocate(&downloaded, &target)?;
        info!(path = %final_path.display(), "download complete");
        Ok(final_path)
    }
}

/// Download every family in order, stopping at the first failure.
pub async fn download_all(
    downloader: &Downloader,
    families: &[MetricFamily],
) -> Result<Vec<(MetricFamily, PathBuf)>, AcquireError> {
    let mut out = Vec::with_capacity(families.len());
    for &family in families {
        let path = downloader.download(family).await?;
        out.push((family, path));
    }
    Ok(out)
}
