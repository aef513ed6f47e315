// src/fetch/download.rs
use futures::StreamExt;
use reqwest::{header::CONTENT_DISPOSITION, Client, Response};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs as tokio_fs,
    io::AsyncWriteExt,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};
use url::Url;

use super::error::AcquireError;

/// Suffixes of files that are still being written.
pub const IN_PROGRESS_SUFFIXES: &[&str] = &[".crdownload", ".tmp"];

/// Emit a progress line every this many polls.
const PROGRESS_EVERY: u32 = 10;

pub fn is_in_progress(name: &str) -> bool {
    IN_PROGRESS_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Remove regular files left in `dir` by earlier runs. Failures are logged.
pub fn clear_dir(dir: &Path) -> Result<(), AcquireError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not remove stale download");
            }
        }
    }
    Ok(())
}

fn in_progress_count(dir: &Path) -> Result<usize, AcquireError> {
    let mut n = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if is_in_progress(&entry.file_name().to_string_lossy()) {
            n += 1;
        }
    }
    Ok(n)
}

/// Poll `dir` every `poll` until no in-progress markers remain, giving up
/// once `ceiling` has elapsed.
pub async fn wait_for_download(
    dir: &Path,
    ceiling: Duration,
    poll: Duration,
) -> Result<(), AcquireError> {
    let mut waited = Duration::ZERO;
    let mut polls: u32 = 0;
    loop {
        sleep(poll).await;
        waited += poll;
        polls += 1;

        if in_progress_count(dir)? == 0 {
            debug!(waited_ms = waited.as_millis() as u64, "download settled");
            return Ok(());
        }
        if waited >= ceiling {
            error!(dir = %dir.display(), ?ceiling, "timed out waiting for download");
            return Err(AcquireError::Timeout(ceiling));
        }
        if polls % PROGRESS_EVERY == 0 {
            info!(waited_s = waited.as_secs(), "waiting for download");
        }
    }
}

/// File name from `Content-Disposition`, else the last URL segment.
pub fn file_name_for(resp: &Response, url: &Url) -> String {
    let from_header = resp
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_file_name);
    let from_url = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    from_header
        .or(from_url)
        .and_then(|name| {
            // never let a header steer the file outside the download dir
            Path::new(&name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "download.xlsx".to_string())
}

fn disposition_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// Request `url` and start streaming it into `dir` as `<name>.crdownload`.
/// The returned task renames the file to `<name>` once the body is complete.
/// A host that has not answered within `ceiling` yields [`AcquireError::Timeout`].
pub async fn start_download(
    client: &Client,
    url: &Url,
    dir: &Path,
    ceiling: Duration,
) -> Result<JoinHandle<Result<PathBuf, AcquireError>>, AcquireError> {
    let resp = match timeout(ceiling, client.get(url.clone()).send()).await {
        Ok(resp) => resp?.error_for_status()?,
        Err(_) => {
            error!(%url, ?ceiling, "download did not start");
            return Err(AcquireError::Timeout(ceiling));
        }
    };
    let name = file_name_for(&resp, url);
    let final_path = dir.join(&name);
    let partial = dir.join(format!("{}.crdownload", name));
    let file = tokio_fs::File::create(&partial).await?;
    info!(file = %name, "download started");

    Ok(tokio::spawn(finish_download(resp, file, partial, final_path)))
}

async fn finish_download(
    resp: Response,
    file: tokio_fs::File,
    partial: PathBuf,
    final_path: PathBuf,
) -> Result<PathBuf, AcquireError> {
    match stream_body(resp, file).await {
        Ok(bytes) => {
            tokio_fs::rename(&partial, &final_path).await?;
            info!(file = %final_path.display(), bytes, "download finished");
            Ok(final_path)
        }
        Err(e) => {
            let _ = tokio_fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

async fn stream_body(resp: Response, mut file: tokio_fs::File) -> Result<u64, AcquireError> {
    let mut stream = resp.bytes_stream();
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(total)
}

/// Move `src` to `target`, replacing any previous file, and check that the
/// result is non-empty.
pub fn relocate(src: &Path, target: &Path) -> Result<PathBuf, AcquireError> {
    if !src.is_file() {
        return Err(AcquireError::MissingFile(src.to_path_buf()));
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if target.exists() {
        fs::remove_file(target)?;
    }
    if fs::rename(src, target).is_err() {
        // rename fails across filesystems
        fs::copy(src, target)?;
        fs::remove_file(src)?;
    }
    info!(path = %target.display(), "moved download");

    match fs::metadata(target) {
        Ok(m) if m.len() > 0 => Ok(target.to_path_buf()),
        Ok(_) => Err(AcquireError::EmptyFile(target.to_path_buf())),
        Err(_) => Err(AcquireError::MissingFile(target.to_path_buf())),
    }
}
