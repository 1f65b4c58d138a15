//! The public entry point: owns configuration and the download gate, runs a
//! traversal strategy and awaits every download it schedules.
//!
//! # Flow
//! 1. The directory URL is validated before any request is made.
//! 2. The output root is cleared (when configured) and recreated.
//! 3. The chosen [`Traversal`] emits [`DownloadRequest`]s into a channel while
//!    this module drains it, spawning one task per request.
//! 4. All tasks are joined. Listing failures abort the run and cancel the
//!    in-flight downloads; a failed file only surfaces after its siblings finish.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::HttpCatalog;
use crate::config::ClientConfig;
use crate::contract::{DirectoryLister, Traversal};
use crate::download::{DownloadExecutor, DownloadOutcome, DownloadPolicy};
use crate::error::{Result, SmolderError};
use crate::files::{DownloadRequest, ListedFile, ManifestEntry, RepositoryVersion};
use crate::traverse::{LiveCrawl, ManifestWalk, WalkOptions, WalkStats};
use crate::validate::validate_url;

/// What one directory download did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Requests emitted by the traversal.
    pub requested: usize,
    pub downloaded: usize,
    pub skipped_existing: usize,
    pub skipped_filter: usize,
    pub skipped_depth: usize,
    /// Files the server reported as missing.
    pub abandoned: usize,
    /// Listing entries of an unsupported type.
    pub unsupported: usize,
    /// Entries whose name would place them outside the output root.
    pub rejected: usize,
    pub failed: usize,
}

impl DownloadReport {
    fn record(&mut self, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded => self.downloaded += 1,
            DownloadOutcome::SkippedExisting => self.skipped_existing += 1,
            DownloadOutcome::SkippedFilter => self.skipped_filter += 1,
            DownloadOutcome::Abandoned(_) => self.abandoned += 1,
        }
    }

    fn absorb(&mut self, stats: &WalkStats) {
        self.requested = stats.requested;
        self.skipped_depth = stats.skipped_depth;
        self.unsupported = stats.unsupported;
        self.rejected = stats.rejected;
    }
}

/// Client for mirroring CommunityDragon directories.
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
    catalog: HttpCatalog,
    gate: Arc<Semaphore>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build()?;
        Ok(Self::with_http_client(config, http))
    }

    /// Build a client around an existing HTTP client, sharing its pool.
    pub fn with_http_client(config: ClientConfig, http: reqwest::Client) -> Self {
        config.trace_loaded();
        let catalog = HttpCatalog::new(http.clone(), &config);
        let gate = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            config,
            http,
            catalog,
            gate,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn catalog(&self) -> &HttpCatalog {
        &self.catalog
    }

    /// Replace the download gate. Requires exclusive access, so it can only
    /// happen between runs.
    pub fn set_concurrency(&mut self, concurrency: usize) {
        let concurrency = concurrency.max(1);
        debug!(concurrency, "Rebuilding download gate");
        self.config.concurrency = concurrency;
        self.gate = Arc::new(Semaphore::new(concurrency));
    }

    pub async fn list_versions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<RepositoryVersion>> {
        until_cancelled(cancel, self.catalog.list_versions()).await
    }

    pub async fn list_manifest(
        &self,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ManifestEntry>> {
        until_cancelled(cancel, self.catalog.list_manifest(version)).await
    }

    /// List one directory. `url` is the listing API URL.
    pub async fn list_directory(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListedFile>> {
        until_cancelled(cancel, self.catalog.list_directory(url)).await
    }

    /// Manifest URLs matching `query` as a regular expression, see [`search`].
    pub fn search(&self, query: &str, entries: &[ManifestEntry]) -> Result<Vec<String>> {
        search(query, entries)
    }

    /// Mirror `url` by crawling the listing API, one request per directory.
    pub async fn download_directory(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        self.download_with(url, &LiveCrawl::new(&self.catalog), cancel)
            .await
    }

    /// Mirror `url` using a manifest fetched beforehand with
    /// [`Client::list_manifest`]. Issues no listing requests.
    pub async fn download_directory_from_manifest(
        &self,
        url: &str,
        entries: &[ManifestEntry],
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        self.download_with(url, &ManifestWalk::new(entries), cancel)
            .await
    }

    /// Mirror `url` with any traversal strategy.
    pub async fn download_with<T>(
        &self,
        url: &str,
        strategy: &T,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport>
    where
        T: Traversal + ?Sized,
    {
        let start = validate_url(url, &self.config.domain)?;
        self.prepare_output_root().await?;
        info!(url = %url, "Downloading directory");

        let run = cancel.child_token();
        let executor = DownloadExecutor::new(
            self.http.clone(),
            DownloadPolicy::from(&self.config),
            Arc::clone(&self.gate),
        );
        let options = WalkOptions {
            output_root: self.config.output_dir.clone(),
            max_depth: self.config.max_depth,
        };

        let (sink, mut requests) = mpsc::unbounded_channel::<DownloadRequest>();
        let mut tasks = JoinSet::new();
        let walk = strategy.walk(&start, &options, sink, &run);
        tokio::pin!(walk);
        let mut walked: Option<Result<WalkStats>> = None;

        loop {
            tokio::select! {
                result = &mut walk, if walked.is_none() => {
                    if let Err(e) = &result {
                        error!(error = %e, url = %url, "Traversal failed, cancelling downloads");
                        run.cancel();
                    }
                    walked = Some(result);
                }
                request = requests.recv() => match request {
                    Some(request) => {
                        let executor = executor.clone();
                        let token = run.clone();
                        tasks.spawn(async move {
                            let outcome = executor.download_one(&request, &token).await;
                            (request, outcome)
                        });
                    }
                    None => break,
                },
            }
        }
        let walked = match walked {
            Some(result) => result,
            None => walk.await,
        };

        let mut report = DownloadReport::default();
        let mut first_failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.record(outcome),
                Ok((request, Err(e))) => {
                    report.failed += 1;
                    if !matches!(e, SmolderError::Cancelled) {
                        error!(error = %e, url = %request.source_url, "File download failed");
                    }
                    first_failure.get_or_insert(e);
                }
                Err(e) => {
                    report.failed += 1;
                    first_failure.get_or_insert(SmolderError::Task(e));
                }
            }
        }

        let stats = walked?;
        report.absorb(&stats);
        if cancel.is_cancelled() {
            warn!(url = %url, ?report, "Directory download cancelled");
            return Err(SmolderError::Cancelled);
        }
        if let Some(e) = first_failure {
            error!(url = %url, failed = report.failed, "Directory finished with failures");
            return Err(e);
        }

        info!(url = %url, ?report, "Finished directory");
        Ok(report)
    }

    async fn prepare_output_root(&self) -> Result<()> {
        let root = &self.config.output_dir;
        if self.config.overwrite_output {
            match tokio::fs::remove_dir_all(root).await {
                Ok(()) => debug!(path = %root.display(), "Removed existing output directory"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(error = %e, path = %root.display(), "Output directory is likely being used")
                }
            }
        }
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| SmolderError::io(root, e))
    }
}

/// Every manifest URL containing a match for `query`.
///
/// The query is embedded as `^.*(?:{query}).*$` and matched against each URL
/// on its own, so results are whole URLs in manifest order. Matching is
/// case-sensitive.
pub fn search(query: &str, entries: &[ManifestEntry]) -> Result<Vec<String>> {
    let pattern = Regex::new(&format!("^.*(?:{query}).*$"))?;
    Ok(entries
        .iter()
        .map(ManifestEntry::url)
        .filter(|url| pattern.is_match(url))
        .collect())
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    operation: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SmolderError::Cancelled),
        result = operation => result,
    }
}
