// src/fetch/page.rs
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use super::error::AcquireError;

/// The spreadsheet link on each index page.
pub const DOWNLOAD_SELECTOR: &str = "a.download";

async fn get_text_core(client: &Client, url: &Url) -> Result<String, AcquireError> {
    debug!("Fetching text from {}", url);
    Ok(client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?)
}

/// GET `url`, retrying transport and status errors with exponential backoff.
pub async fn get_text_with_retry(
    client: &Client,
    url: &Url,
    max_retries: u32,
    initial_backoff: Duration,
) -> Result<String, AcquireError> {
    let mut attempts = 0;
    loop {
        match get_text_core(client, url).await {
            Ok(t) => return Ok(t),
            Err(e) if attempts < max_retries => {
                attempts += 1;
                let backoff = initial_backoff * 2u32.pow(attempts - 1);
                warn!(%url, attempt = attempts, delay_ms = backoff.as_millis() as u64, error = %e, "Retrying");
                sleep(backoff).await;
            }
            Err(e) => {
                error!(%url, error = %e, "Exhausted retries");
                return Err(e);
            }
        }
    }
}

/// Resolve the first `a.download` href in `html` against `base`.
pub fn extract_download_link(html: &str, base: &Url) -> Option<Url> {
    let selector = Selector::parse(DOWNLOAD_SELECTOR).expect("download selector should parse");
    Html::parse_document(html)
        .select(&selector)
        .filter_map(|e| e.value().attr("href"))
        .find_map(|href| base.join(href.trim()).ok())
}

/// Fetch the index page and locate its spreadsheet link.
pub async fn find_download_link(
    client: &Client,
    page: &Url,
    max_retries: u32,
    initial_backoff: Duration,
) -> Result<Url, AcquireError> {
    let html = get_text_with_retry(client, page, max_retries, initial_backoff).await?;
    extract_download_link(&html, page).ok_or_else(|| AcquireError::LinkNotFound {
        page: page.to_string(),
        selector: DOWNLOAD_SELECTOR,
    })
}
