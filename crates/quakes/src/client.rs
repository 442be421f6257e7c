use flightcache::CoalescingCache;
use futures::future::join_all;
use url::Url;

use crate::model::{Quake, QuakeError, QuakeLocation, decode_feed, decode_location};

/// The default USGS summary feed, listing all earthquakes of the past hour.
pub const DEFAULT_FEED: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_hour.geojson";

pub type LocationCache = CoalescingCache<Url, QuakeLocation, QuakeError>;

/// Fetches earthquakes and their locations.
///
/// Locations are looked up through a [`LocationCache`] keyed by the detail URL, so a detail
/// record is downloaded at most once, no matter how many quakes refer to it or how many lookups
/// run at the same time.
#[derive(Clone, Debug)]
pub struct QuakeClient {
    http: reqwest::Client,
    feed: Url,
    locations: LocationCache,
}

impl QuakeClient {
    pub fn new(http: reqwest::Client, feed: Url, locations: LocationCache) -> Self {
        Self {
            http,
            feed,
            locations,
        }
    }

    /// Downloads and decodes the summary feed.
    pub async fn quakes(&self) -> Result<Vec<Quake>, QuakeError> {
        tracing::debug!(feed = %self.feed, "Fetching quakes");
        let data = fetch(&self.http, self.feed.clone()).await?;
        decode_feed(&data)
    }

    /// Resolves the location of the quake with the given detail URL.
    pub async fn quake_location(&self, detail: &Url) -> Result<QuakeLocation, QuakeError> {
        let http = self.http.clone();
        let url = detail.clone();
        self.locations
            .resolve(detail.clone(), move || async move {
                tracing::debug!(%url, "Fetching quake location");
                let data = fetch(&http, url).await?;
                decode_location(&data)
            })
            .await
    }

    /// Resolves the locations of all `quakes` concurrently.
    ///
    /// Quakes whose location cannot be resolved are returned without one.
    pub async fn locate_all(&self, quakes: Vec<Quake>) -> Vec<Quake> {
        let lookups = quakes.into_iter().map(|mut quake| async move {
            match self.quake_location(&quake.detail).await {
                Ok(location) => quake.location = Some(location),
                Err(err) => {
                    tracing::warn!(
                        error = &err as &dyn std::error::Error,
                        code = %quake.code,
                        "Failed to resolve quake location",
                    );
                }
            }
            quake
        });

        join_all(lookups).await
    }
}

async fn fetch(http: &reqwest::Client, url: Url) -> Result<bytes::Bytes, QuakeError> {
    let response = http.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?)
}
