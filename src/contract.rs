//! Async seams between traversal, listing and the orchestrator.
//!
//! `DirectoryLister` is the only network-facing dependency of the live crawl,
//! so it carries an `automock` for tests. `Traversal` is the strategy
//! interface: the live crawl and the manifest walk both turn a start URL into
//! a stream of [`DownloadRequest`]s and are picked at the call site.

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::Result;
use crate::files::{DownloadRequest, ListedFile};
use crate::traverse::{WalkOptions, WalkStats};

/// Lists the immediate children of one remote directory.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// Fetch the listing at `url` (already rewritten to the listing API path).
    async fn list_directory(&self, url: &str) -> Result<Vec<ListedFile>>;
}

/// A way of enumerating every file below a directory URL.
#[async_trait]
pub trait Traversal: Send + Sync {
    /// Emit one request per file below `start` into `sink`.
    ///
    /// Returns once enumeration is finished; the requests themselves are
    /// executed by whoever drains the channel.
    async fn walk(
        &self,
        start: &Url,
        options: &WalkOptions,
        sink: UnboundedSender<DownloadRequest>,
        cancel: &CancellationToken,
    ) -> Result<WalkStats>;
}
