#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Outage record types shared by the ingestion and analysis pipelines.
//!
//! Outage features are stored as raw `GeoJSON` features so that every
//! upstream property survives a round trip through the sharded store. The
//! typed [`OutageRecord`] view is only built when features are read back
//! for analysis.

use std::fmt;

use geo::MultiPolygon;
use geojson::{Feature, JsonObject, feature::Id};
use serde::{Deserialize, Serialize};

/// Upstream property holding the outage job identifier.
pub const JOB_ID_PROPERTY: &str = "JOB_ID";

/// Upstream property holding the outage start time (epoch milliseconds).
pub const OFF_PROPERTY: &str = "OFF_DTTM";

/// Property set by the normalizer to the time the run observed the record.
pub const ON_PROPERTY: &str = "ON_DTTM";

/// Property set by the normalizer to the whole-hour outage duration.
pub const HOURS_PROPERTY: &str = "OFF_HOURS";

/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Whole hours between two epoch-millisecond timestamps, rounded toward
/// negative infinity. `None` when the difference does not fit in an `i64`.
#[must_use]
pub const fn hours_between(start_ms: i64, end_ms: i64) -> Option<i64> {
    match end_ms.checked_sub(start_ms) {
        Some(diff) => Some(diff.div_euclid(MILLIS_PER_HOUR)),
        None => None,
    }
}

// ── Shard keys ───────────────────────────────────────────────────────────

/// The date partition a job lives in.
///
/// Job identifiers carry their date of origin as `YYMMDD` in characters
/// `2..8` (the first two characters are a region prefix), so the same job
/// always lands in the same shard no matter which run observes it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardKey {
    year: String,
    month: String,
    day: String,
}

impl ShardKey {
    /// Two-digit year.
    #[must_use]
    pub fn year(&self) -> &str {
        &self.year
    }

    /// Two-digit month (`01`–`12`).
    #[must_use]
    pub fn month(&self) -> &str {
        &self.month
    }

    /// Two-digit day of month (`01`–`31`).
    #[must_use]
    pub fn day(&self) -> &str {
        &self.day
    }

    /// Builds a key from already-split path components, applying the same
    /// validation as [`shard_key_of`].
    ///
    /// # Errors
    ///
    /// Returns [`ShardKeyError`] if any component is not a valid two-digit
    /// date part.
    pub fn from_parts(year: &str, month: &str, day: &str) -> Result<Self, ShardKeyError> {
        shard_key_of(&format!("--{year}{month}{day}"))
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.year, self.month, self.day)
    }
}

/// Reasons a job identifier cannot be mapped to a shard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardKeyError {
    /// The identifier is shorter than prefix + `YYMMDD`.
    #[error("job id {job_id:?} is too short to carry a YYMMDD date")]
    TooShort {
        /// The offending job id.
        job_id: String,
    },

    /// Characters `2..8` are not all ASCII digits.
    #[error("job id {job_id:?} does not carry a numeric YYMMDD date after its prefix")]
    NotNumeric {
        /// The offending job id.
        job_id: String,
    },

    /// The month digits are outside `01..=12`.
    #[error("job id {job_id:?} has invalid month {month:?}")]
    InvalidMonth {
        /// The offending job id.
        job_id: String,
        /// The month digits found.
        month: String,
    },

    /// The day digits are outside `01..=31`.
    #[error("job id {job_id:?} has invalid day {day:?}")]
    InvalidDay {
        /// The offending job id.
        job_id: String,
        /// The day digits found.
        day: String,
    },
}

const SHARD_PREFIX_LEN: usize = 2;
const SHARD_DATE_LEN: usize = 6;

/// Derives the shard key of a job identifier.
///
/// The identifier must be at least eight characters long, with characters
/// `2..8` forming a `YYMMDD` date (month `01`–`12`, day `01`–`31`).
///
/// # Errors
///
/// Returns [`ShardKeyError`] if the identifier does not satisfy that
/// format.
pub fn shard_key_of(job_id: &str) -> Result<ShardKey, ShardKeyError> {
    let bytes = job_id.as_bytes();
    if bytes.len() < SHARD_PREFIX_LEN + SHARD_DATE_LEN {
        return Err(ShardKeyError::TooShort {
            job_id: job_id.to_string(),
        });
    }

    let date = &bytes[SHARD_PREFIX_LEN..SHARD_PREFIX_LEN + SHARD_DATE_LEN];
    if !date.iter().all(u8::is_ascii_digit) {
        return Err(ShardKeyError::NotNumeric {
            job_id: job_id.to_string(),
        });
    }

    // All six bytes are ASCII digits, so these slices sit on char
    // boundaries.
    let date = &job_id[SHARD_PREFIX_LEN..SHARD_PREFIX_LEN + SHARD_DATE_LEN];
    let (year, month, day) = (&date[0..2], &date[2..4], &date[4..6]);

    if !matches!(month.parse::<u8>(), Ok(1..=12)) {
        return Err(ShardKeyError::InvalidMonth {
            job_id: job_id.to_string(),
            month: month.to_string(),
        });
    }
    if !matches!(day.parse::<u8>(), Ok(1..=31)) {
        return Err(ShardKeyError::InvalidDay {
            job_id: job_id.to_string(),
            day: day.to_string(),
        });
    }

    Ok(ShardKey {
        year: year.to_string(),
        month: month.to_string(),
        day: day.to_string(),
    })
}

// ── Feature accessors ────────────────────────────────────────────────────

/// Returns the job id of a feature: its string `id`, falling back to the
/// `JOB_ID` property. Empty strings count as missing.
#[must_use]
pub fn job_id_of(feature: &Feature) -> Option<&str> {
    let from_id = match &feature.id {
        Some(Id::String(id)) if !id.is_empty() => Some(id.as_str()),
        _ => None,
    };

    from_id
        .or_else(|| {
            feature
                .property(JOB_ID_PROPERTY)
                .and_then(serde_json::Value::as_str)
        })
        .filter(|id| !id.is_empty())
}

/// Reads an epoch-millisecond property, accepting integer or float JSON
/// numbers. Non-finite floats and non-numbers read as `None`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn millis_property(feature: &Feature, key: &str) -> Option<i64> {
    let value = feature.property(key)?;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}

// ── Analysis types ───────────────────────────────────────────────────────

/// Errors building an [`OutageRecord`] from a stored feature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The feature has neither a string id nor a `JOB_ID` property.
    #[error("stored feature has no job id")]
    MissingJobId,
}

/// Typed view of a stored outage feature.
#[derive(Debug, Clone, PartialEq)]
pub struct OutageRecord {
    /// Job identifier.
    pub job_id: String,
    /// Outage start (epoch ms), from `OFF_DTTM`.
    pub start: Option<i64>,
    /// Time the outage was last observed (epoch ms), from `ON_DTTM`.
    pub end: Option<i64>,
    /// Whole-hour duration, from `OFF_HOURS`. Only meaningful with `end`.
    pub duration_hours: Option<i64>,
    /// Feature geometry. `None` when absent or not convertible.
    pub geometry: Option<geo::Geometry<f64>>,
}

impl OutageRecord {
    /// Builds the typed view of a stored feature.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingJobId`] if the feature carries no job
    /// id.
    pub fn from_feature(feature: &Feature) -> Result<Self, RecordError> {
        let job_id = job_id_of(feature).ok_or(RecordError::MissingJobId)?;
        let end = millis_property(feature, ON_PROPERTY);
        let geometry = feature
            .geometry
            .clone()
            .and_then(|g| geo::Geometry::<f64>::try_from(g).ok());

        Ok(Self {
            job_id: job_id.to_string(),
            start: millis_property(feature, OFF_PROPERTY),
            end,
            duration_hours: end.and_then(|_| millis_property(feature, HOURS_PROPERTY)),
            geometry,
        })
    }
}

/// A land-use parcel loaded for one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct LandParcel {
    /// Position of the parcel in its layer. Not persisted anywhere.
    pub landuse_id: usize,
    /// Parcel boundary.
    pub geometry: MultiPolygon<f64>,
    /// The parcel's own attributes, passed through to the summary output.
    pub properties: JsonObject,
}

/// A coalesced, non-overlapping outage interval within one parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutageEvent {
    /// Parcel the event belongs to.
    pub landuse_id: usize,
    /// 1-based, in time order within the parcel.
    pub event_id: u32,
    /// Event start (epoch ms).
    pub start: i64,
    /// Event end (epoch ms).
    pub end: i64,
    /// Whole hours between `start` and `end`.
    pub duration_hours: i64,
    /// Jobs merged into this event, in start order.
    pub job_ids: Vec<String>,
}

/// Outage statistics for one parcel.
///
/// Every statistic is `None` when the parcel had no outage events, so that
/// "no outages observed" stays distinct from "zero-hour outages".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelSummary {
    /// Parcel the summary describes.
    pub landuse_id: usize,
    /// Sum of event durations in hours.
    pub total_length: Option<i64>,
    /// Mean event duration in hours.
    pub avg_length: Option<f64>,
    /// Median event duration in hours.
    pub median_length: Option<f64>,
    /// Number of distinct events.
    pub outage_count: Option<u64>,
}

impl ParcelSummary {
    /// A summary for a parcel with no events.
    #[must_use]
    pub const fn no_data(landuse_id: usize) -> Self {
        Self {
            landuse_id,
            total_length: None,
            avg_length: None,
            median_length: None,
            outage_count: None,
        }
    }
}
