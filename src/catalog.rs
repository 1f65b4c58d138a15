//! HTTP access to the file server's listing API, version index and manifests.

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::contract::DirectoryLister;
use crate::error::{Result, SmolderError};
use crate::files::{DirectoryEntry, ListedFile, ManifestEntry, RepositoryVersion};
use crate::validate::validate_url;

/// Path segment the server mounts its JSON listing API under.
pub const LISTING_SEGMENT: &str = "json";

/// Root entries that are housekeeping files or another product, not versions.
pub const NON_VERSION_ENTRIES: [&str; 4] = [
    "runeterra",
    "favicon.ico",
    "status.live.txt",
    "status.pbe.txt",
];

/// Rewrites a directory URL to its listing API URL by inserting
/// [`LISTING_SEGMENT`] after the host. URLs already pointing at the API are
/// returned unchanged.
pub fn listing_url(url: &Url) -> Url {
    let prefix = format!("/{LISTING_SEGMENT}/");
    if url.path().starts_with(&prefix) {
        return url.clone();
    }
    let mut listing = url.clone();
    listing.set_path(&format!("/{LISTING_SEGMENT}{}", url.path()));
    listing
}

/// Listing and manifest client for one file server.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    http: reqwest::Client,
    root: String,
    domain: String,
}

impl HttpCatalog {
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            root: config.root().to_owned(),
            domain: config.domain.clone(),
        }
    }

    /// Fetch and decode the raw listing records at `url`.
    pub async fn list_raw(&self, url: &str) -> Result<Vec<DirectoryEntry>> {
        validate_url(url, &self.domain)?;

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Listing request failed");
            return Err(SmolderError::FetchFailed {
                url: url.to_owned(),
                status,
            });
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<Option<Vec<DirectoryEntry>>>(&body) {
            Ok(entries) => Ok(entries.unwrap_or_default()),
            Err(e) => {
                error!(error = %e, url = %url, "Failed to deserialize listing");
                Err(SmolderError::DecodeFailed {
                    url: url.to_owned(),
                    source: e,
                })
            }
        }
    }

    /// Every version currently published at the server root.
    pub async fn list_versions(&self) -> Result<Vec<RepositoryVersion>> {
        let url = format!("{}/{LISTING_SEGMENT}/", self.root);
        let versions: Vec<RepositoryVersion> = self
            .list_raw(&url)
            .await?
            .into_iter()
            .filter(|entry| !NON_VERSION_ENTRIES.contains(&entry.name.as_str()))
            .map(|entry| entry.name)
            .collect();
        debug!(count = versions.len(), "Listed versions");
        Ok(versions)
    }

    /// Every file of `version`, read from its `files.exported.txt`.
    pub async fn list_manifest(&self, version: &str) -> Result<Vec<ManifestEntry>> {
        let versions = self.list_versions().await?;
        if !versions.iter().any(|v| v == version) {
            error!(version = %version, "Requested version is not published");
            return Err(SmolderError::InvalidVersion(version.to_owned()));
        }

        let url = format!("{}/{version}/cdragon/files.exported.txt", self.root);
        info!(url = %url, "Fetching manifest");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Manifest request failed");
            return Err(SmolderError::FetchFailed { url, status });
        }

        let bytes = response.bytes().await?;
        let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
            error!(error = %e, url = %url, "Manifest is not valid UTF-8");
            SmolderError::ManifestEncoding { url: url.clone() }
        })?;

        let entries: Vec<ManifestEntry> = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(|line| ManifestEntry::with_root(&self.root, line, version))
            .collect();
        info!(version = %version, files = entries.len(), "Parsed manifest");
        Ok(entries)
    }
}

#[async_trait]
impl DirectoryLister for HttpCatalog {
    async fn list_directory(&self, url: &str) -> Result<Vec<ListedFile>> {
        let entries = self.list_raw(url).await?;
        Ok(entries
            .into_iter()
            .map(|raw| ListedFile {
                raw,
                referrer_url: url.to_owned(),
            })
            .collect())
    }
}
