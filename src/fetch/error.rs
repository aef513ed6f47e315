use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Failures that end a family's acquisition. All are fatal to the run.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("no `{selector}` link on {page}")]
    LinkNotFound {
        page: String,
        selector: &'static str,
    },

    #[error("download did not complete within {0:?}")]
    Timeout(Duration),

    #[error("downloaded file missing: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("downloaded file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("download task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
