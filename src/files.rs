//! Value types for the remote tree: manifest lines, listing records and the
//! download requests derived from them.

use std::path::PathBuf;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Deserializer};

use crate::config::DEFAULT_ROOT_URL;

/// Opaque label of one snapshot of the remote tree ("latest", "pbe", "14.22").
pub type RepositoryVersion = String;

/// Everything except RFC 3986 unreserved characters is escaped.
const DATA_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One line of a version's `files.exported.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Root-relative path inside the version, e.g. `plugins/x/v1/items.json`.
    pub path: String,
    pub version: RepositoryVersion,
    root: String,
}

impl ManifestEntry {
    /// An entry served from the public raw file server.
    pub fn new(path: impl Into<String>, version: impl Into<RepositoryVersion>) -> Self {
        Self::with_root(DEFAULT_ROOT_URL, path, version)
    }

    pub fn with_root(
        root: &str,
        path: impl Into<String>,
        version: impl Into<RepositoryVersion>,
    ) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            root: root.trim_end_matches('/').to_owned(),
        }
    }

    /// Where the file is served: `<root>/<version>/<path>`.
    pub fn url(&self) -> String {
        format!("{}/{}/{}", self.root, self.version, self.path)
    }

    /// [`Self::url`] with each path segment escaped, safe to send as a request.
    pub fn request_url(&self) -> String {
        let escaped: Vec<String> = self
            .path
            .split('/')
            .map(|segment| utf8_percent_encode(segment, DATA_ESCAPE).to_string())
            .collect();
        format!(
            "{}/{}/{}",
            self.root,
            utf8_percent_encode(&self.version, DATA_ESCAPE),
            escaped.join("/")
        )
    }

    /// Every folder the file sits in, outermost first.
    pub fn directory_segments(&self) -> Vec<&str> {
        if !self.path.contains('/') {
            return Vec::new();
        }
        let mut segments: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
        segments.pop();
        segments
    }

    pub fn file_name(&self) -> &str {
        if !self.path.contains('/') {
            return &self.path;
        }
        self.path
            .split('/')
            .filter(|s| !s.is_empty())
            .last()
            .unwrap_or_default()
    }
}

/// Type tag of a listing record. Anything the server reports that is not a
/// plain file or directory (broken links and the like) is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
    #[serde(other)]
    Other,
}

/// One record of a JSON directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(rename = "mtime", default, deserialize_with = "lenient_text")]
    pub modified_time: String,
    #[serde(rename = "size", default, deserialize_with = "lenient_size")]
    pub size_bytes: Option<u64>,
}

impl DirectoryEntry {
    /// The name escaped for use as a single URL path segment.
    pub fn encoded_name(&self) -> String {
        utf8_percent_encode(&self.name, DATA_ESCAPE).to_string()
    }
}

/// A listing record together with the directory URL it was listed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub raw: DirectoryEntry,
    pub referrer_url: String,
}

impl ListedFile {
    pub fn url(&self) -> String {
        format!("{}{}", self.referrer_url, self.raw.encoded_name())
    }
}

/// A single file to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source_url: String,
    pub local_dir: PathBuf,
    pub file_name: String,
}

impl DownloadRequest {
    pub fn target_path(&self) -> PathBuf {
        self.local_dir.join(&self.file_name)
    }
}

// Older snapshots emit sizes as strings or floats and occasionally numeric
// mtimes. Both are accepted instead of failing the whole listing.
fn lenient_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Integer(u64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Size>::deserialize(deserializer)? {
        None => None,
        Some(Size::Integer(n)) => Some(n),
        Some(Size::Float(f)) if f.is_finite() && f >= 0.0 => Some(f as u64),
        Some(Size::Float(_)) => None,
        Some(Size::Text(text)) => text.trim().parse().ok(),
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Text>::deserialize(deserializer)? {
        None => String::new(),
        Some(Text::Text(text)) => text,
        Some(Text::Number(number)) => number.to_string(),
    })
}
