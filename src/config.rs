use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_ROOT_URL: &str = "https://raw.communitydragon.org";
pub const DEFAULT_DOMAIN: &str = "communitydragon.org";

/// Immutable settings for one [`crate::client::Client`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum number of downloads in flight at once.
    pub concurrency: usize,
    /// Folder that receives the mirrored tree.
    pub output_dir: PathBuf,
    /// Attempts per file before giving up.
    pub retries: u32,
    /// Directory levels below the start URL to descend. 0 means unbounded.
    pub max_depth: usize,
    /// Delete the output folder before each directory download.
    pub overwrite_output: bool,
    /// Leave files that already exist on disk untouched.
    pub skip_existing: bool,
    /// Only download files whose name contains this substring.
    pub filter: Option<String>,
    /// Scheme and host of the raw file server, without a trailing slash.
    pub root_url: String,
    /// Host (or parent domain) every directory URL must belong to.
    pub domain: String,
    pub request_timeout_secs: Option<u64>,
    /// Base delay between retries, doubled per attempt. 0 retries immediately.
    pub retry_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            output_dir: PathBuf::from("out"),
            retries: 3,
            max_depth: 0,
            overwrite_output: true,
            skip_existing: true,
            filter: None,
            root_url: DEFAULT_ROOT_URL.to_owned(),
            domain: DEFAULT_DOMAIN.to_owned(),
            request_timeout_secs: None,
            retry_backoff_ms: 0,
        }
    }
}

impl ClientConfig {
    pub fn trace_loaded(&self) {
        info!(
            output_dir = %self.output_dir.display(),
            concurrency = self.concurrency,
            retries = self.retries,
            max_depth = self.max_depth,
            root_url = %self.root_url,
            "Loaded client config"
        );
        debug!(?self, "Client config loaded (full debug)");
    }

    /// The filter, if it is set to something other than whitespace.
    pub fn active_filter(&self) -> Option<&str> {
        self.filter
            .as_deref()
            .filter(|filter| !filter.trim().is_empty())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn root(&self) -> &str {
        self.root_url.trim_end_matches('/')
    }
}
