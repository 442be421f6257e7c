use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use flightcache::config::Config;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::client::DEFAULT_FEED;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Outputs the quakes as a table.
    Table,
    /// Outputs the quakes as JSON.
    Json,
}

/// Lists recent earthquakes together with their locations.
///
/// The locations are looked up concurrently from each quake's detail record. Lookups of the same
/// detail record are coalesced and cached in memory.
#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about)]
struct Cli {
    /// The GeoJSON summary feed to list quakes from.
    #[arg(long, default_value = DEFAULT_FEED)]
    pub feed: Url,

    /// Path to a YAML configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// The severity level of logging output, overriding the configuration file.
    ///
    /// Possible values:
    /// off, error, warn, info, debug, trace
    #[arg(long)]
    pub log_level: Option<LevelFilter>,

    /// Only resolve the locations of the first `limit` quakes.
    #[arg(long)]
    pub limit: Option<usize>,

    /// The output format.
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Timeout for every single download, for example `10s`.
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub timeout: std::time::Duration,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub feed: Url,
    pub config: Config,
    pub limit: Option<usize>,
    pub output_format: OutputFormat,
    pub timeout: std::time::Duration,
}

impl Settings {
    pub fn get() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self> {
        let mut config = Config::get(cli.config.as_deref()).with_context(|| match &cli.config {
            Some(path) => format!("Could not load configuration from {}", path.display()),
            None => "Could not load default configuration".to_owned(),
        })?;

        if let Some(level) = cli.log_level {
            config.logging.level = level;
        }

        Ok(Self {
            feed: cli.feed,
            config,
            limit: cli.limit,
            output_format: cli.format,
            timeout: cli.timeout,
        })
    }
}
