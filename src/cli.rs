//! Command line glue: argument parsing and printing only. Everything else is
//! delegated to [`crate::client::Client`].

use crate::client::Client;
use crate::config::ClientConfig;
use crate::load_config::resolve_config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// CLI for smolder: mirror CommunityDragon directories.
#[derive(Parser, Debug)]
#[clap(
    name = "smolder",
    version,
    about = "Mirror CommunityDragon directories onto local storage"
)]
pub struct Cli {
    /// Path to a YAML client config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the published versions
    Versions,
    /// List one directory through the listing API
    Ls {
        /// Directory URL, e.g. https://raw.communitydragon.org/latest/game/
        url: String,
    },
    /// Print every file path of a version
    Manifest { version: String },
    /// Search a version's files with a regular expression
    Search { version: String, query: String },
    /// Download a directory
    Download {
        /// Directory URL, ending with '/'
        url: String,
        /// Enumerate files from this version's manifest instead of crawling
        #[clap(long)]
        manifest: Option<String>,
        #[clap(long, short)]
        output: Option<PathBuf>,
        /// Directory levels to descend, 0 for unbounded
        #[clap(long)]
        max_depth: Option<usize>,
        #[clap(long)]
        concurrency: Option<usize>,
        #[clap(long)]
        retries: Option<u32>,
        /// Only download files whose name contains this text
        #[clap(long)]
        filter: Option<String>,
        /// Keep the existing output directory
        #[clap(long)]
        no_overwrite: bool,
        /// Download files even when they already exist
        #[clap(long)]
        no_skip_existing: bool,
    },
}

/// Async CLI entrypoint shared by `main` and the tests.
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    tracing::debug!(command = ?cli.command, "Running command");

    let mut config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Versions => {
            let client = Client::new(config)?;
            for version in client.list_versions(&cancel).await? {
                println!("{version}");
            }
        }
        Commands::Ls { url } => {
            let client = Client::new(config)?;
            let parsed = crate::validate::validate_url(&url, &client.config().domain)?;
            let listing = crate::catalog::listing_url(&parsed);
            for file in client.list_directory(listing.as_str(), &cancel).await? {
                println!("{:?}\t{}", file.raw.kind, file.raw.name);
            }
        }
        Commands::Manifest { version } => {
            let client = Client::new(config)?;
            for entry in client.list_manifest(&version, &cancel).await? {
                println!("{}", entry.path);
            }
        }
        Commands::Search { version, query } => {
            let client = Client::new(config)?;
            let entries = client.list_manifest(&version, &cancel).await?;
            for url in client.search(&query, &entries)? {
                println!("{url}");
            }
        }
        Commands::Download {
            url,
            manifest,
            output,
            max_depth,
            concurrency,
            retries,
            filter,
            no_overwrite,
            no_skip_existing,
        } => {
            apply_download_flags(
                &mut config,
                output,
                max_depth,
                retries,
                filter,
                no_overwrite,
                no_skip_existing,
            );
            let mut client = Client::new(config)?;
            if let Some(concurrency) = concurrency {
                client.set_concurrency(concurrency);
            }
            let report = match manifest {
                Some(version) => {
                    let entries = client.list_manifest(&version, &cancel).await?;
                    client
                        .download_directory_from_manifest(&url, &entries, &cancel)
                        .await?
                }
                None => client.download_directory(&url, &cancel).await?,
            };
            println!("Download complete.\nReport:");
            println!("{:#?}", report);
        }
    }

    Ok(())
}

fn apply_download_flags(
    config: &mut ClientConfig,
    output: Option<PathBuf>,
    max_depth: Option<usize>,
    retries: Option<u32>,
    filter: Option<String>,
    no_overwrite: bool,
    no_skip_existing: bool,
) {
    if let Some(output) = output {
        config.output_dir = output;
    }
    if let Some(max_depth) = max_depth {
        config.max_depth = max_depth;
    }
    if let Some(retries) = retries {
        config.retries = retries;
    }
    if filter.is_some() {
        config.filter = filter;
    }
    if no_overwrite {
        config.overwrite_output = false;
    }
    if no_skip_existing {
        config.skip_existing = false;
    }
}
