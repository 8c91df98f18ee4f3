#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Outage analysis over land-use parcels.
//!
//! Reads every stored outage, joins it to the parcels it touches, merges
//! overlapping jobs into events per parcel, and summarizes each parcel's
//! event durations. Results are written as `GeoJSON` for mapping and as
//! CSV for spreadsheets.

pub mod events;
pub mod report;
pub mod summary;

use std::path::PathBuf;

use outage_map_outage_models::RecordError;
use outage_map_spatial::SpatialError;
use outage_map_store::StoreError;

pub use report::{AnalysisReport, analyze, load_outages};

/// Errors that can occur during an analysis run.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// The shard store could not be read.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Parcels could not be loaded or joined.
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),

    /// A stored feature could not be turned into a record.
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// The store holds no outages, so every parcel would read as no data.
    #[error("No outages stored under {}", root.display())]
    NoOutages {
        /// Store root that was read.
        root: PathBuf,
    },

    /// No stored outage touches any parcel. Usually the parcels cover a
    /// different area than the feed.
    #[error("None of {outages} stored outages intersect any of {parcels} parcels")]
    NoIntersections {
        /// Outage records loaded.
        outages: usize,
        /// Parcels in the layer.
        parcels: usize,
    },

    /// Writing an output file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `GeoJSON` output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
