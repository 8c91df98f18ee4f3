//! Validation and enrichment of raw outage features.
//!
//! A raw feature is accepted when it carries a job id that maps to a shard
//! and a non-zero `OFF_DTTM`. Accepted features are stamped with the time
//! the run observed them and their whole-hour duration so far.

use geojson::{Feature, feature::Id};
use outage_map_outage_models::{
    HOURS_PROPERTY, JOB_ID_PROPERTY, OFF_PROPERTY, ON_PROPERTY, ShardKey, ShardKeyError,
    hours_between, millis_property, shard_key_of,
};

/// A feature that passed validation, ready for the sharded store.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOutage {
    /// Job identifier (also the feature `id`).
    pub job_id: String,
    /// Shard the job belongs to.
    pub shard_key: ShardKey,
    /// The enriched feature.
    pub feature: Feature,
}

/// Why a raw feature was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// No non-empty string `JOB_ID` property.
    #[error("missing JOB_ID")]
    MissingJobId,
    /// `OFF_DTTM` is absent, null, zero, or not a number.
    #[error("job {job_id} has no OFF_DTTM")]
    MissingOffTime {
        /// The job whose start time is missing.
        job_id: String,
    },
    /// `OFF_DTTM` is so far from the observation time that the duration
    /// cannot be represented.
    #[error("job {job_id} has an out-of-range OFF_DTTM ({off})")]
    InvalidOffTime {
        /// The job whose start time is unusable.
        job_id: String,
        /// The start time as read.
        off: i64,
    },
    /// The job id does not encode a shard date.
    #[error(transparent)]
    InvalidJobId(#[from] ShardKeyError),
}

/// Counts of skipped features by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    /// Features without a job id.
    pub missing_job_id: u64,
    /// Features without a start time.
    pub missing_off_time: u64,
    /// Features whose start time is out of range.
    pub invalid_off_time: u64,
    /// Features whose job id has no shard date.
    pub invalid_job_id: u64,
}

impl RejectionCounts {
    /// Total skipped features.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.missing_job_id + self.missing_off_time + self.invalid_off_time + self.invalid_job_id
    }

    /// Adds another run's counts to these.
    pub const fn add(&mut self, other: &Self) {
        self.missing_job_id += other.missing_job_id;
        self.missing_off_time += other.missing_off_time;
        self.invalid_off_time += other.invalid_off_time;
        self.invalid_job_id += other.invalid_job_id;
    }

    fn record(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::MissingJobId => self.missing_job_id += 1,
            Rejection::MissingOffTime { .. } => self.missing_off_time += 1,
            Rejection::InvalidOffTime { .. } => self.invalid_off_time += 1,
            Rejection::InvalidJobId(_) => self.invalid_job_id += 1,
        }
    }
}

/// Validates a raw feature and stamps it with `observed_at` (epoch ms).
///
/// Sets `ON_DTTM` to `observed_at`, `OFF_HOURS` to the whole hours since
/// `OFF_DTTM`, and the feature `id` to the job id. Every other property is
/// left as the feed sent it.
///
/// # Errors
///
/// Returns a [`Rejection`] describing why the feature cannot be stored.
pub fn normalize(mut feature: Feature, observed_at: i64) -> Result<NormalizedOutage, Rejection> {
    let job_id = feature
        .property(JOB_ID_PROPERTY)
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(Rejection::MissingJobId)?;

    let off = millis_property(&feature, OFF_PROPERTY)
        .filter(|off| *off != 0)
        .ok_or_else(|| Rejection::MissingOffTime {
            job_id: job_id.clone(),
        })?;

    let shard_key = shard_key_of(&job_id)?;

    let hours = hours_between(off, observed_at).ok_or_else(|| Rejection::InvalidOffTime {
        job_id: job_id.clone(),
        off,
    })?;

    feature.set_property(ON_PROPERTY, observed_at);
    feature.set_property(HOURS_PROPERTY, hours);
    feature.id = Some(Id::String(job_id.clone()));

    Ok(NormalizedOutage {
        job_id,
        shard_key,
        feature,
    })
}

/// Normalizes a batch, logging and counting every skipped feature.
#[must_use]
pub fn normalize_batch(
    features: Vec<Feature>,
    observed_at: i64,
) -> (Vec<NormalizedOutage>, RejectionCounts) {
    let mut accepted = Vec::with_capacity(features.len());
    let mut rejected = RejectionCounts::default();

    for feature in features {
        match normalize(feature, observed_at) {
            Ok(outage) => accepted.push(outage),
            Err(rejection) => {
                log::warn!("Skipping outage feature: {rejection}");
                rejected.record(&rejection);
            }
        }
    }

    (accepted, rejected)
}

#[cfg(test)]
mod tests {
    use outage_map_outage_models::MILLIS_PER_HOUR;

    use super::*;

    fn raw(props: serde_json::Value) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                -83.74, 42.28,
            ]))),
            id: None,
            properties: props.as_object().cloned(),
            foreign_members: None,
        }
    }

    #[test]
    fn stamps_observation_and_duration() {
        let off = 1_710_000_000_000_i64;
        let ts = off + 5 * MILLIS_PER_HOUR + 59 * 60 * 1000;
        let feature = raw(serde_json::json!({
            "JOB_ID": "DT240315000001",
            "OFF_DTTM": off,
            "NUM_CUST": 12,
        }));

        let outage = normalize(feature, ts).unwrap();
        assert_eq!(outage.job_id, "DT240315000001");
        assert_eq!(outage.shard_key.to_string(), "24/03/15");
        assert_eq!(
            outage.feature.id,
            Some(Id::String("DT240315000001".to_string()))
        );
        assert_eq!(
            outage.feature.property(ON_PROPERTY),
            Some(&serde_json::json!(ts))
        );
        assert_eq!(
            outage.feature.property(HOURS_PROPERTY),
            Some(&serde_json::json!(5))
        );
        assert_eq!(
            outage.feature.property("NUM_CUST"),
            Some(&serde_json::json!(12))
        );
        assert!(outage.feature.geometry.is_some());
    }

    #[test]
    fn overwrites_stale_observation() {
        let feature = raw(serde_json::json!({
            "JOB_ID": "DT240315000001",
            "OFF_DTTM": 1,
            "ON_DTTM": 2,
            "OFF_HOURS": 99,
        }));
        let outage = normalize(feature, 1 + 2 * MILLIS_PER_HOUR).unwrap();
        assert_eq!(
            outage.feature.property(HOURS_PROPERTY),
            Some(&serde_json::json!(2))
        );
    }

    #[test]
    fn rejects_missing_or_empty_job_id() {
        assert_eq!(
            normalize(raw(serde_json::json!({ "OFF_DTTM": 1 })), 10),
            Err(Rejection::MissingJobId)
        );
        assert_eq!(
            normalize(raw(serde_json::json!({ "JOB_ID": "", "OFF_DTTM": 1 })), 10),
            Err(Rejection::MissingJobId)
        );
    }

    #[test]
    fn rejects_missing_null_or_zero_off_time() {
        for props in [
            serde_json::json!({ "JOB_ID": "DT240315000001" }),
            serde_json::json!({ "JOB_ID": "DT240315000001", "OFF_DTTM": null }),
            serde_json::json!({ "JOB_ID": "DT240315000001", "OFF_DTTM": 0 }),
            serde_json::json!({ "JOB_ID": "DT240315000001", "OFF_DTTM": "yesterday" }),
        ] {
            assert!(matches!(
                normalize(raw(props), 10),
                Err(Rejection::MissingOffTime { .. })
            ));
        }
    }

    #[test]
    fn rejects_job_id_without_shard_date() {
        let feature = raw(serde_json::json!({ "JOB_ID": "BAD", "OFF_DTTM": 1 }));
        assert!(matches!(
            normalize(feature, 10),
            Err(Rejection::InvalidJobId(ShardKeyError::TooShort { .. }))
        ));
    }

    #[test]
    fn batch_counts_rejections_without_aborting() {
        let features = vec![
            raw(serde_json::json!({ "JOB_ID": "DT240315000001", "OFF_DTTM": 1 })),
            raw(serde_json::json!({ "OFF_DTTM": 1 })),
            raw(serde_json::json!({ "JOB_ID": "DT240315000002" })),
            raw(serde_json::json!({ "JOB_ID": "DTXX0315000003", "OFF_DTTM": 1 })),
            raw(serde_json::json!({ "JOB_ID": "DT240316000004", "OFF_DTTM": 1 })),
        ];

        let (accepted, rejected) = normalize_batch(features, 10);
        assert_eq!(accepted.len(), 2);
        assert_eq!(
            rejected,
            RejectionCounts {
                missing_job_id: 1,
                missing_off_time: 1,
                invalid_off_time: 0,
                invalid_job_id: 1,
            }
        );
        assert_eq!(rejected.total(), 3);
    }

    #[test]
    fn far_out_of_range_off_time_is_rejected_not_fatal() {
        let features = vec![
            raw(serde_json::json!({ "JOB_ID": "DT240315000001", "OFF_DTTM": -9.3e18 })),
            raw(serde_json::json!({ "JOB_ID": "DT240315000002", "OFF_DTTM": 1 })),
        ];

        let (accepted, rejected) = normalize_batch(features, 1_710_000_000_000);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].job_id, "DT240315000002");
        assert_eq!(rejected.invalid_off_time, 1);
        assert_eq!(rejected.total(), 1);
    }

    #[test]
    fn out_of_range_off_time_names_the_job() {
        let feature = raw(serde_json::json!({ "JOB_ID": "DT240315000001", "OFF_DTTM": -9.3e18 }));
        assert!(matches!(
            normalize(feature, 1_710_000_000_000),
            Err(Rejection::InvalidOffTime { job_id, off }) if job_id == "DT240315000001" && off == i64::MIN
        ));
    }
}
