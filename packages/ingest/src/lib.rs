#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for merging outage feeds into the sharded store.
//!
//! One run drains a [`FeatureSource`], stamps every valid feature with the
//! run's observation time, and merges the lot into the store in a single
//! write. Running it again later overwrites each still-listed job with its
//! newer observation, which is how an outage's end time moves forward.

use std::path::Path;
use std::time::Instant;

use outage_map_source::arcgis::ArcGisSource;
use outage_map_source::feed::FeedDefinition;
use outage_map_source::file::FileSource;
use outage_map_source::normalize::{NormalizedOutage, RejectionCounts, normalize_batch};
use outage_map_source::progress::ProgressCallback;
use outage_map_source::{FeatureSource, SourceError};
use outage_map_store::{ShardEntry, ShardedStore, StoreError};

/// Errors that end an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The source could not be set up.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Merging into the store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Counts from one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Raw features the source produced.
    pub fetched: u64,
    /// Features that passed validation and were merged.
    pub accepted: u64,
    /// Features skipped, by reason.
    pub skipped: RejectionCounts,
    /// Shard files rewritten.
    pub shards_written: usize,
}

/// The current time as epoch milliseconds, truncated to whole seconds.
#[must_use]
pub fn observed_now() -> i64 {
    chrono::Utc::now().timestamp() * 1000
}

/// Drains `source` and merges its valid features into `store`.
///
/// Every accepted feature is stamped with `observed_at`. A source that
/// gives up part-way still has what it produced merged.
///
/// # Errors
///
/// Returns [`IngestError::Store`] if the merge fails.
pub async fn ingest(
    source: &mut dyn FeatureSource,
    store: &ShardedStore,
    observed_at: i64,
    progress: &dyn ProgressCallback,
) -> Result<IngestSummary, IngestError> {
    let start = Instant::now();
    let label = source.label().to_string();
    log::info!("Ingesting outages from {label}");

    let mut summary = IngestSummary::default();
    let mut outages: Vec<NormalizedOutage> = Vec::new();
    let mut batch_num: u64 = 0;

    while let Some(batch) = source.next_batch().await {
        batch_num += 1;
        let raw_count = batch.len() as u64;
        summary.fetched += raw_count;

        let (accepted, skipped) = normalize_batch(batch, observed_at);
        let accepted_count = accepted.len() as u64;
        summary.accepted += accepted_count;
        summary.skipped.add(&skipped);
        outages.extend(accepted);

        progress.inc(raw_count);
        progress.set_message(format!("{label}: {} features fetched", summary.fetched));
        log::info!("{label}: batch {batch_num}, accepted {accepted_count}/{raw_count}");
    }

    log::info!("Merging {} features into {}", outages.len(), store.root().display());
    let written = store.write_entries(outages.iter().map(|outage| ShardEntry {
        key: &outage.shard_key,
        job_id: &outage.job_id,
        feature: &outage.feature,
    }))?;
    summary.shards_written = written.shards_written;

    progress.finish(format!(
        "{label}: merged {} features into {} shards",
        summary.accepted, summary.shards_written
    ));
    log::info!(
        "Ingest complete for {label}: {} merged ({} skipped of {} fetched), {} shards, took {:.1}s",
        summary.accepted,
        summary.skipped.total(),
        summary.fetched,
        summary.shards_written,
        start.elapsed().as_secs_f64()
    );

    Ok(summary)
}

/// Fetches a feed over HTTP and merges it.
///
/// # Errors
///
/// Returns [`IngestError`] if the HTTP client cannot be built or the merge
/// fails.
pub async fn sync_feed(
    feed: &FeedDefinition,
    store: &ShardedStore,
    observed_at: i64,
    progress: &dyn ProgressCallback,
) -> Result<IngestSummary, IngestError> {
    let mut source = ArcGisSource::from_feed(feed)?;
    ingest(&mut source, store, observed_at, progress).await
}

/// Merges a local `GeoJSON` file.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be read or the merge fails.
pub async fn import_file(
    path: &Path,
    store: &ShardedStore,
    observed_at: i64,
    progress: &dyn ProgressCallback,
) -> Result<IngestSummary, IngestError> {
    let mut source = FileSource::open(path)?;
    ingest(&mut source, store, observed_at, progress).await
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use geojson::Feature;
    use outage_map_outage_models::{MILLIS_PER_HOUR, OutageRecord};
    use outage_map_source::progress::NullProgress;

    use super::*;

    const OFF: i64 = 1_760_875_200_000;

    struct VecSource {
        batches: VecDeque<Vec<Feature>>,
    }

    impl VecSource {
        fn new(batches: Vec<Vec<Feature>>) -> Self {
            Self {
                batches: batches.into(),
            }
        }
    }

    #[async_trait]
    impl FeatureSource for VecSource {
        fn label(&self) -> &str {
            "memory"
        }

        async fn next_batch(&mut self) -> Option<Vec<Feature>> {
            self.batches.pop_front()
        }
    }

    fn raw(props: serde_json::Value) -> Feature {
        serde_json::from_value(serde_json::json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [-83.1, 42.3] },
            "properties": props,
        }))
        .unwrap()
    }

    fn outage(job_id: &str) -> Feature {
        raw(serde_json::json!({ "JOB_ID": job_id, "OFF_DTTM": OFF }))
    }

    #[tokio::test]
    async fn merges_accepted_features_and_counts_skips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardedStore::new(dir.path());
        let mut source = VecSource::new(vec![
            vec![outage("DT251019000001"), outage("DT251020000002")],
            vec![
                raw(serde_json::json!({ "OFF_DTTM": OFF })),
                raw(serde_json::json!({ "JOB_ID": "DT251019000003", "OFF_DTTM": 0 })),
                raw(serde_json::json!({ "JOB_ID": "DT25", "OFF_DTTM": OFF })),
                raw(serde_json::json!({ "JOB_ID": "DT251019000004", "OFF_DTTM": -9.3e18 })),
            ],
        ]);

        let summary = ingest(
            &mut source,
            &store,
            OFF + 3 * MILLIS_PER_HOUR,
            &NullProgress,
        )
        .await
        .unwrap();

        assert_eq!(summary.fetched, 6);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.skipped.missing_job_id, 1);
        assert_eq!(summary.skipped.missing_off_time, 1);
        assert_eq!(summary.skipped.invalid_job_id, 1);
        assert_eq!(summary.skipped.invalid_off_time, 1);
        assert_eq!(summary.skipped.total(), 4);
        assert_eq!(summary.shards_written, 2);

        let stored = store.read_all().unwrap();
        assert_eq!(stored.len(), 2);
        let record = OutageRecord::from_feature(&stored[0]).unwrap();
        assert_eq!(record.job_id, "DT251019000001");
        assert_eq!(record.end, Some(OFF + 3 * MILLIS_PER_HOUR));
        assert_eq!(record.duration_hours, Some(3));
    }

    #[tokio::test]
    async fn later_run_supersedes_earlier_observation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardedStore::new(dir.path());

        for hours in [1, 6] {
            let mut source = VecSource::new(vec![vec![outage("DT251019000001")]]);
            ingest(
                &mut source,
                &store,
                OFF + hours * MILLIS_PER_HOUR,
                &NullProgress,
            )
            .await
            .unwrap();
        }

        let stored = store.read_all().unwrap();
        assert_eq!(stored.len(), 1);
        let record = OutageRecord::from_feature(&stored[0]).unwrap();
        assert_eq!(record.duration_hours, Some(6));
    }

    #[tokio::test]
    async fn empty_source_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardedStore::new(dir.path().join("store"));
        let mut source = VecSource::new(Vec::new());

        let summary = ingest(&mut source, &store, OFF, &NullProgress)
            .await
            .unwrap();

        assert_eq!(summary, IngestSummary::default());
        assert!(!store.root().exists());
    }

    #[tokio::test]
    async fn imports_a_local_collection() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("snapshot.geojson");
        std::fs::write(
            &input,
            serde_json::json!({
                "type": "FeatureCollection",
                "features": [
                    { "type": "Feature", "geometry": null,
                      "properties": { "JOB_ID": "DT251019000001", "OFF_DTTM": OFF } }
                ]
            })
            .to_string(),
        )
        .unwrap();
        let store = ShardedStore::new(dir.path().join("store"));

        let summary = import_file(&input, &store, OFF, &NullProgress)
            .await
            .unwrap();

        assert_eq!(summary.accepted, 1);
        assert_eq!(store.list_shards().unwrap()[0].records, 1);
    }

    #[test]
    fn observation_time_is_whole_seconds() {
        assert_eq!(observed_now() % 1000, 0);
    }
}
