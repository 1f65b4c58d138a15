//! Error taxonomy for directory mirroring.
//!
//! Listing and manifest failures are structural and abort a traversal.
//! Per-file failures (`DownloadFailed`, `DownloadExhausted`) are reported once
//! every scheduled download has been awaited.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum SmolderError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },
    #[error("invalid version provided: {0:?}")]
    InvalidVersion(String),
    #[error("invalid search query: {0}")]
    InvalidQuery(#[from] regex::Error),
    #[error("fetch of {url} failed with status {status}")]
    FetchFailed { url: String, status: StatusCode },
    #[error("failed to decode listing from {url}: {source}")]
    DecodeFailed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest from {url} is not valid UTF-8")]
    ManifestEncoding { url: String },
    #[error("download of {url} failed with status {status}")]
    DownloadFailed { url: String, status: StatusCode },
    #[error("download of {url} failed after exhausting all retries")]
    DownloadExhausted { url: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("download task failed: {0}")]
    Task(#[from] JoinError),
}

impl SmolderError {
    pub(crate) fn invalid_url(url: &str, reason: &'static str) -> Self {
        SmolderError::InvalidUrl {
            url: url.to_owned(),
            reason,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SmolderError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SmolderError>;
