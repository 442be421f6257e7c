use anyhow::{Context, Result};
use flightcache::logging::{ensure_log_error, init_logging};
use flightcache::metrics::configure_statsd;

use client::{LocationCache, QuakeClient};
use settings::{OutputFormat, Settings};

mod client;
mod model;
mod output;
mod settings;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::get()?;
    init_logging(&settings.config.logging);

    if let Err(err) = run(settings).await {
        ensure_log_error(&err);
        return Err(err);
    }
    Ok(())
}

async fn run(settings: Settings) -> Result<()> {
    let metrics = &settings.config.metrics;
    if let Some(statsd) = &metrics.statsd {
        configure_statsd(&metrics.prefix, statsd.as_str(), metrics.custom_tags.clone())?;
    }

    let http = reqwest::Client::builder()
        .timeout(settings.timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let locations = LocationCache::from_config(&settings.config.cache);
    let client = QuakeClient::new(http, settings.feed.clone(), locations.clone());

    let mut quakes = client.quakes().await.context("Failed to fetch quakes")?;
    if let Some(limit) = settings.limit {
        quakes.truncate(limit);
    }
    tracing::info!(count = quakes.len(), "Resolving quake locations");

    let quakes = client.locate_all(quakes).await;
    flightcache::metric!(gauge("quakes.locations.cached") = locations.entry_count());

    match settings.output_format {
        OutputFormat::Table => output::print_table(&quakes),
        OutputFormat::Json => output::print_json(&quakes)?,
    }

    Ok(())
}
