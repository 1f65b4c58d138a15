//! Fetches single files behind a shared concurrency gate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{Result, SmolderError};
use crate::files::DownloadRequest;

/// Per-file rules, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPolicy {
    /// Attempts per file, counting the first.
    pub retries: u32,
    pub skip_existing: bool,
    pub filter: Option<String>,
    pub backoff: Duration,
}

impl From<&ClientConfig> for DownloadPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            retries: config.retries,
            skip_existing: config.skip_existing,
            filter: config.active_filter().map(str::to_owned),
            backoff: config.retry_backoff(),
        }
    }
}

/// How a single request ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    SkippedExisting,
    SkippedFilter,
    /// The server reported the file as missing; it is not retried.
    Abandoned(StatusCode),
}

/// Delay before retry number `retry` (0-indexed): `base * 2^retry`.
pub fn retry_delay(retry: u32, base: Duration) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(retry))
}

/// Stateless downloader. Cloning is cheap and every clone shares the gate.
#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    http: reqwest::Client,
    policy: Arc<DownloadPolicy>,
    gate: Arc<Semaphore>,
}

impl DownloadExecutor {
    pub fn new(http: reqwest::Client, policy: DownloadPolicy, gate: Arc<Semaphore>) -> Self {
        Self {
            http,
            policy: Arc::new(policy),
            gate,
        }
    }

    pub async fn download_one(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let url = request.source_url.as_str();
        let target = request.target_path();

        if self.policy.skip_existing && fs::try_exists(&target).await.unwrap_or(false) {
            debug!(path = %target.display(), "Skipping file as it exists");
            return Ok(DownloadOutcome::SkippedExisting);
        }
        if let Some(filter) = &self.policy.filter {
            if !request.file_name.contains(filter.as_str()) {
                debug!(file = %request.file_name, filter = %filter, "File doesn't pass filter");
                return Ok(DownloadOutcome::SkippedFilter);
            }
        }

        for attempt in 0..self.policy.retries {
            if attempt > 0 && !self.policy.backoff.is_zero() {
                let delay = retry_delay(attempt - 1, self.policy.backoff);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SmolderError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SmolderError::Cancelled),
                permit = self.gate.acquire() => permit.map_err(|_| SmolderError::Cancelled)?,
            };

            info!(url = %url, attempt = attempt + 1, "Downloading file");
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SmolderError::Cancelled),
                sent = self.http.get(url).send() => sent,
            };
            let response = match sent {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(error = %e, url = %url, "Timed out request");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_server_error() {
                warn!(status = %status, url = %url, "Received 5xx response");
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                error!(url = %url, "Bad file url");
                return Ok(DownloadOutcome::Abandoned(status));
            }
            if !status.is_success() {
                error!(status = %status, url = %url, "Received 4xx response");
                return Err(SmolderError::DownloadFailed {
                    url: url.to_owned(),
                    status,
                });
            }
            debug!(url = %url, "Successful request");

            match write_body(response, request, cancel).await {
                Ok(()) => return Ok(DownloadOutcome::Downloaded),
                Err(SmolderError::Http(e)) if e.is_timeout() => {
                    warn!(error = %e, url = %url, "Timed out reading body");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        error!(url = %url, "Failed retrying");
        Err(SmolderError::DownloadExhausted {
            url: url.to_owned(),
        })
    }
}

/// Streams the body into a sibling temp file and renames it over the target.
async fn write_body(
    mut response: reqwest::Response,
    request: &DownloadRequest,
    cancel: &CancellationToken,
) -> Result<()> {
    // create_dir_all tolerates a concurrent worker creating the same path.
    fs::create_dir_all(&request.local_dir)
        .await
        .map_err(|e| SmolderError::io(&request.local_dir, e))?;

    let target = request.target_path();
    let partial = partial_path(&request.local_dir, &request.file_name);

    let written: Result<()> = async {
        let mut file = fs::File::create(&partial)
            .await
            .map_err(|e| SmolderError::io(&partial, e))?;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SmolderError::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk)
                .await
                .map_err(|e| SmolderError::io(&partial, e))?;
        }
        file.flush().await.map_err(|e| SmolderError::io(&partial, e))?;
        drop(file);
        fs::rename(&partial, &target)
            .await
            .map_err(|e| SmolderError::io(&target, e))
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&partial).await;
    }
    written
}

fn partial_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!(".{file_name}.{}.part", Uuid::new_v4().simple()))
}
