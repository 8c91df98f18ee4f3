#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Outage feature sources and record normalization.
//!
//! A [`FeatureSource`] hands the ingestion pipeline one batch of raw
//! `GeoJSON` features at a time. Paging, retries, and TLS settings stay
//! inside the source; the pipeline only sees batches and end-of-data.
//! Raw features are then validated and enriched by [`normalize`].

pub mod arcgis;
pub mod client;
pub mod feed;
pub mod file;
pub mod normalize;
pub mod progress;
pub mod retry;

use std::path::PathBuf;

use async_trait::async_trait;
use geojson::Feature;

/// Errors that can occur while talking to an outage data source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// `GeoJSON` structure was invalid.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Feed definition could not be parsed.
    #[error("Feed config error: {0}")]
    Config(#[from] toml::de::Error),

    /// The server answered with a status that is not worth retrying, or
    /// every retry was used up.
    #[error("Request failed: {message}")]
    Request {
        /// Description of what went wrong.
        message: String,
    },

    /// A local file parsed as `GeoJSON` but holds no features.
    #[error("{} holds a bare geometry, expected features", path.display())]
    NotFeatures {
        /// File that was read.
        path: PathBuf,
    },
}

/// A producer of raw outage features.
///
/// Implementations own their pagination and retry policy. A source that
/// gives up after exhausting its retries reports end-of-data; whatever it
/// produced before that point is still ingested.
#[async_trait]
pub trait FeatureSource: Send {
    /// Label used in log messages (e.g., the feed id).
    fn label(&self) -> &str;

    /// Returns the next batch of features, or `None` once no more data is
    /// available this run.
    async fn next_batch(&mut self) -> Option<Vec<Feature>>;
}
