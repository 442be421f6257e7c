use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// An error that happens while fetching or decoding earthquake data.
///
/// Errors are cloned to every caller waiting for the same detail lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuakeError {
    /// The payload was decoded, but did not contain a usable location.
    #[error("missing data")]
    MissingData,
    /// The remote server could not be reached or responded with an error.
    #[error("download failed: {0}")]
    Download(String),
    /// The payload is not valid JSON of the expected shape.
    #[error("malformed: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for QuakeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Download(err.to_string())
    }
}

impl From<serde_json::Error> for QuakeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// A single earthquake of the summary feed.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Quake {
    #[serde(rename = "mag")]
    pub magnitude: f64,
    pub place: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub code: String,
    /// The URL of the detail record, which contains the location.
    pub detail: Url,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub location: Option<QuakeLocation>,
}

#[derive(Deserialize)]
struct Feature {
    properties: serde_json::Value,
}

#[derive(Deserialize)]
struct GeoJson {
    features: Vec<Feature>,
}

/// Decodes the quakes of a GeoJSON summary feed.
///
/// Features that cannot be decoded into a [`Quake`], for example because their magnitude is
/// `null`, are skipped.
pub fn decode_feed(data: &[u8]) -> Result<Vec<Quake>, QuakeError> {
    let feed: GeoJson = serde_json::from_slice(data)?;

    let quakes = feed
        .features
        .into_iter()
        .filter_map(
            |feature| match serde_json::from_value::<Quake>(feature.properties) {
                Ok(quake) => Some(quake),
                Err(err) => {
                    tracing::trace!(error = %err, "Skipping undecodable feature");
                    None
                }
            },
        )
        .collect();

    Ok(quakes)
}

/// The location of an earthquake, taken from its detail record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QuakeLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
struct Detail {
    properties: DetailProperties,
}

#[derive(Deserialize)]
struct DetailProperties {
    products: Products,
}

#[derive(Deserialize)]
struct Products {
    origin: Vec<Origin>,
}

#[derive(Deserialize)]
struct Origin {
    properties: OriginProperties,
}

/// Coordinates are transmitted as strings.
#[derive(Deserialize)]
struct OriginProperties {
    latitude: String,
    longitude: String,
}

/// Decodes the location out of a GeoJSON detail record, using its first origin.
pub fn decode_location(data: &[u8]) -> Result<QuakeLocation, QuakeError> {
    let detail: Detail = serde_json::from_slice(data)?;
    let origin = detail
        .properties
        .products
        .origin
        .into_iter()
        .next()
        .ok_or(QuakeError::MissingData)?;

    let latitude = origin.properties.latitude.parse();
    let longitude = origin.properties.longitude.parse();
    match (latitude, longitude) {
        (Ok(latitude), Ok(longitude)) => Ok(QuakeLocation {
            latitude,
            longitude,
        }),
        _ => Err(QuakeError::MissingData),
    }
}
