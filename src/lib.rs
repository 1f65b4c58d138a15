#![doc = "smolder: mirror CommunityDragon directory trees onto local storage."]

//! A directory on the raw file server is enumerated either by crawling its
//! JSON listing API ([`traverse::LiveCrawl`]) or by filtering the version's
//! `files.exported.txt` manifest ([`traverse::ManifestWalk`]). Every file found
//! is fetched by [`download::DownloadExecutor`] behind a shared concurrency
//! gate owned by [`client::Client`].
//!
//! # Usage
//! ```no_run
//! # async fn example() -> smolder::error::Result<()> {
//! use smolder::{Client, ClientConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = Client::new(ClientConfig { max_depth: 2, ..ClientConfig::default() })?;
//! let cancel = CancellationToken::new();
//! let latest = client.list_manifest("latest", &cancel).await?;
//! client
//!     .download_directory_from_manifest(
//!         "https://raw.communitydragon.org/latest/game/data/images/",
//!         &latest,
//!         &cancel,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod files;
pub mod load_config;
pub mod traverse;
pub mod validate;

pub use client::{search, Client, DownloadReport};
pub use config::ClientConfig;
pub use error::{Result, SmolderError};
pub use files::{DirectoryEntry, DownloadRequest, EntryKind, ListedFile, ManifestEntry};
