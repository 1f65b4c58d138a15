//! Turns a directory URL into download requests.
//!
//! [`LiveCrawl`] walks the listing API one directory at a time from a LIFO
//! frontier. [`ManifestWalk`] filters a pre-fetched manifest instead and never
//! touches the network. Both place files at
//! `output_root/<segments below the start URL>/<file name>`, so they produce the
//! same tree for the same subtree.
//!
//! The live crawl reads listings from the `/json` API but fetches files from the
//! plain file endpoint, so both strategies request identical file URLs.
//!
//! Names come from the server and are never trusted as paths: a segment that is
//! empty, `.`, `..` or contains a path separator drops the file or directory.

use std::borrow::Cow;
use std::path::PathBuf;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{listing_url, LISTING_SEGMENT};
use crate::contract::{DirectoryLister, Traversal};
use crate::error::{Result, SmolderError};
use crate::files::{DownloadRequest, EntryKind, ManifestEntry};

/// Where files land and how deep a traversal may go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    pub output_root: PathBuf,
    /// Directory levels below the start URL to descend. 0 means unbounded.
    pub max_depth: usize,
}

impl WalkOptions {
    /// Whether a directory `depth` levels below the start is out of bounds.
    pub fn exceeds_depth(&self, depth: usize) -> bool {
        self.max_depth > 0 && depth >= self.max_depth
    }

    pub fn local_dir<S: AsRef<str>>(&self, segments: &[S]) -> PathBuf {
        segments
            .iter()
            .fold(self.output_root.clone(), |dir, segment| dir.join(segment.as_ref()))
    }
}

/// Counters from one enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Download requests emitted.
    pub requested: usize,
    /// Directories (live crawl) or files (manifest walk) dropped by the depth limit.
    pub skipped_depth: usize,
    /// Listing records of an unsupported type.
    pub unsupported: usize,
    /// Files or directories whose name would escape the output root.
    pub rejected: usize,
}

/// Crawls the listing API starting at the start URL's listing.
pub struct LiveCrawl<'a, L: ?Sized> {
    lister: &'a L,
}

impl<'a, L: DirectoryLister + ?Sized> LiveCrawl<'a, L> {
    pub fn new(lister: &'a L) -> Self {
        Self { lister }
    }
}

#[async_trait]
impl<L: DirectoryLister + ?Sized> Traversal for LiveCrawl<'_, L> {
    async fn walk(
        &self,
        start: &Url,
        options: &WalkOptions,
        sink: UnboundedSender<DownloadRequest>,
        cancel: &CancellationToken,
    ) -> Result<WalkStats> {
        let seed = listing_url(start).to_string();
        let file_base = file_base_url(start);
        info!(url = %seed, "Crawling directory");

        let mut stats = WalkStats::default();
        let mut frontier = vec![seed.clone()];

        while let Some(directory) = frontier.pop() {
            debug!(url = %decode(&directory), "Listing directory");
            let listing = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SmolderError::Cancelled),
                listing = self.lister.list_directory(&directory) => listing?,
            };

            // An empty listing anywhere means the tree under the start URL is
            // gone; the whole crawl stops, not just this branch.
            if listing.is_empty() {
                info!(url = %directory, "Empty listing, stopping crawl");
                break;
            }

            let encoded_suffix = directory.get(seed.len()..).unwrap_or_default();
            let relative = relative_segments(encoded_suffix);

            for file in listing {
                if file.raw.kind != EntryKind::Other && !is_safe_segment(&file.raw.name) {
                    warn!(url = %file.url(), name = %file.raw.name, "Skipping entry with unsafe name");
                    stats.rejected += 1;
                    continue;
                }
                match file.raw.kind {
                    EntryKind::Directory => {
                        let depth = relative.len() + 1;
                        if options.exceeds_depth(depth) {
                            debug!(
                                depth,
                                max_depth = options.max_depth,
                                name = %file.raw.name,
                                "Skipping directory as it exceeds max depth"
                            );
                            stats.skipped_depth += 1;
                            continue;
                        }
                        debug!(parent = %directory, name = %file.raw.name, "Pushing directory");
                        frontier.push(format!("{directory}{}/", file.raw.encoded_name()));
                    }
                    EntryKind::File => {
                        let request = DownloadRequest {
                            source_url: format!(
                                "{file_base}{encoded_suffix}{}",
                                file.raw.encoded_name()
                            ),
                            local_dir: options.local_dir(&relative),
                            file_name: file.raw.name,
                        };
                        if sink.send(request).is_err() {
                            return Err(SmolderError::Cancelled);
                        }
                        stats.requested += 1;
                    }
                    EntryKind::Other => {
                        warn!(url = %file.url(), "Skipping 'other' type, file is likely missing");
                        stats.unsupported += 1;
                    }
                }
            }

            debug!(count = frontier.len(), "Directories left");
        }

        debug!(requested = stats.requested, "Finished adding files to queue");
        Ok(stats)
    }
}

/// Selects the files under the start URL from an already fetched manifest.
pub struct ManifestWalk<'a> {
    entries: &'a [ManifestEntry],
}

impl<'a> ManifestWalk<'a> {
    pub fn new(entries: &'a [ManifestEntry]) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Traversal for ManifestWalk<'_> {
    async fn walk(
        &self,
        start: &Url,
        options: &WalkOptions,
        sink: UnboundedSender<DownloadRequest>,
        cancel: &CancellationToken,
    ) -> Result<WalkStats> {
        let segments = relative_segments(start.path());
        let Some((version, exclude)) = segments.split_first() else {
            return Err(SmolderError::invalid_url(
                start.as_str(),
                "the URL must name a version",
            ));
        };
        debug!(version = %version, "Parsed patch version");

        let prefix = decode(start.as_str());
        let mut stats = WalkStats::default();

        for entry in self.entries {
            if cancel.is_cancelled() {
                return Err(SmolderError::Cancelled);
            }
            if entry.version != *version || !entry.url().starts_with(&*prefix) {
                continue;
            }

            let directories = entry.directory_segments();
            let file_name = entry.file_name();
            if !directories.iter().all(|segment| is_safe_segment(segment))
                || !is_safe_segment(file_name)
            {
                warn!(path = %entry.path, "Skipping manifest entry with unsafe path");
                stats.rejected += 1;
                continue;
            }
            let relative = strip_common_prefix(&directories, exclude);
            if options.exceeds_depth(relative.len()) {
                debug!(
                    depth = relative.len(),
                    max_depth = options.max_depth,
                    path = %entry.path,
                    "Skipping file as it exceeds max depth"
                );
                stats.skipped_depth += 1;
                continue;
            }

            let request = DownloadRequest {
                source_url: entry.request_url(),
                local_dir: options.local_dir(relative),
                file_name: file_name.to_owned(),
            };
            debug!(directory = %request.local_dir.display(), "Directory path");
            if sink.send(request).is_err() {
                return Err(SmolderError::Cancelled);
            }
            stats.requested += 1;
        }

        Ok(stats)
    }
}

/// The start URL with any listing segment removed, i.e. where files are served.
fn file_base_url(start: &Url) -> String {
    let prefix = format!("/{LISTING_SEGMENT}/");
    match start.path().strip_prefix(prefix.as_str()) {
        Some(rest) => {
            let mut base = start.clone();
            base.set_path(&format!("/{rest}"));
            base.to_string()
        }
        None => start.to_string(),
    }
}

/// Decoded, non-empty path segments. `.` and `..` never become folders.
fn relative_segments(encoded: &str) -> Vec<String> {
    encoded
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| decode(segment).into_owned())
        .filter(|segment| segment != "." && segment != "..")
        .collect()
}

/// Whether `name` can be used as one folder or file name below the output root.
fn is_safe_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn strip_common_prefix<'s>(directories: &'s [&'s str], exclude: &[String]) -> &'s [&'s str] {
    let shared = directories
        .iter()
        .zip(exclude)
        .take_while(|(directory, excluded)| **directory == excluded.as_str())
        .count();
    &directories[shared..]
}

fn decode(text: &str) -> Cow<'_, str> {
    percent_decode_str(text).decode_utf8_lossy()
}
