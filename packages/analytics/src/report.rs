//! End-to-end analysis run and its output files.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geojson::{Feature, FeatureCollection, JsonObject};
use outage_map_outage_models::{OutageEvent, OutageRecord, ParcelSummary};
use outage_map_source::progress::ProgressCallback;
use outage_map_spatial::{Crs, OutageLayer, ParcelLayer, join};
use outage_map_store::ShardedStore;
use outage_map_store::paths::ensure_dir;
use serde::Serialize;

use crate::AnalyticsError;
use crate::events::{coalesce, sort_for_coalescing};
use crate::summary::summarize;

/// Everything one analysis run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    /// All coalesced events, grouped by parcel in layer order.
    pub events: Vec<OutageEvent>,
    /// One summary per parcel, in layer order.
    pub summaries: Vec<ParcelSummary>,
}

/// Reads every stored outage as a WGS84 layer.
///
/// # Errors
///
/// Returns [`AnalyticsError::Store`] if a shard cannot be read, or
/// [`AnalyticsError::Record`] if a stored feature has no job id.
pub fn load_outages(store: &ShardedStore) -> Result<OutageLayer, AnalyticsError> {
    let records = store
        .read_all()?
        .iter()
        .map(OutageRecord::from_feature)
        .collect::<Result<Vec<_>, _>>()?;

    let without_geometry = records.iter().filter(|r| r.geometry.is_none()).count();
    if without_geometry > 0 {
        log::warn!("{without_geometry} stored outages have no usable geometry and will not join");
    }
    log::info!(
        "Loaded {} outage records from {}",
        records.len(),
        store.root().display()
    );

    Ok(OutageLayer::new(Crs::Wgs84, records))
}

/// Runs the full analysis of the store against a parcel layer.
///
/// Outages are reprojected into the parcel layer's reference system,
/// joined, then coalesced and summarized parcel by parcel. Every parcel
/// gets a summary, including those no outage touched.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the store cannot be read or the join
/// fails. Returns [`AnalyticsError::NoOutages`] for an empty store and
/// [`AnalyticsError::NoIntersections`] when no outage touches any parcel,
/// since either would summarize every parcel as no data. Nothing is
/// written in any of these cases.
pub fn analyze(
    store: &ShardedStore,
    parcels: &ParcelLayer,
    progress: &dyn ProgressCallback,
) -> Result<AnalysisReport, AnalyticsError> {
    let outages = load_outages(store)?;
    if outages.records.is_empty() {
        return Err(AnalyticsError::NoOutages {
            root: store.root().to_path_buf(),
        });
    }
    let outages = outages.reproject(parcels.crs);
    let joined = join(parcels, &outages)?;

    if joined.iter().all(|parcel| parcel.records.is_empty()) {
        return Err(AnalyticsError::NoIntersections {
            outages: outages.records.len(),
            parcels: joined.len(),
        });
    }

    progress.set_total(joined.len() as u64);
    progress.set_message("Coalescing outage events".to_string());

    let mut events = Vec::new();
    let mut summaries = Vec::with_capacity(joined.len());

    for parcel in joined {
        let mut records = parcel.records;
        sort_for_coalescing(&mut records);
        let parcel_events = coalesce(parcel.landuse_id, &records);
        summaries.push(summarize(parcel.landuse_id, &parcel_events));
        events.extend(parcel_events);
        progress.inc(1);
    }

    let affected = summaries.iter().filter(|s| s.outage_count.is_some()).count();
    progress.finish(format!(
        "{} events across {affected}/{} parcels",
        events.len(),
        summaries.len()
    ));
    log::info!(
        "Coalesced {} events; {affected} of {} parcels saw outages",
        events.len(),
        summaries.len()
    );

    Ok(AnalysisReport { events, summaries })
}

/// Writes one feature per parcel with its summary statistics attached.
///
/// Each feature keeps the parcel's own properties and gains `landuse_id`,
/// `total_length`, `avg_length`, `median_length`, and `outage_count`
/// (`null` when the parcel had no events). The collection carries the
/// parcel layer's `crs` member.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the file cannot be created or written.
pub fn write_summary_geojson(
    path: &Path,
    parcels: &ParcelLayer,
    summaries: &[ParcelSummary],
) -> Result<(), AnalyticsError> {
    let by_parcel: BTreeMap<usize, &ParcelSummary> =
        summaries.iter().map(|s| (s.landuse_id, s)).collect();

    let features = parcels
        .parcels
        .iter()
        .map(|parcel| {
            let summary = by_parcel
                .get(&parcel.landuse_id)
                .map_or_else(|| ParcelSummary::no_data(parcel.landuse_id), |s| (*s).clone());

            let mut properties = parcel.properties.clone();
            properties.extend(summary_properties(&summary));

            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &parcel.geometry,
                ))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(parcels.crs.to_foreign_members()),
    };

    let mut writer = create(path)?;
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush().map_err(|source| AnalyticsError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!(
        "Wrote {} parcel summaries to {}",
        summaries.len(),
        path.display()
    );
    Ok(())
}

fn summary_properties(summary: &ParcelSummary) -> JsonObject {
    let mut properties = JsonObject::new();
    properties.insert("landuse_id".to_string(), summary.landuse_id.into());
    properties.insert("total_length".to_string(), summary.total_length.into());
    properties.insert("avg_length".to_string(), summary.avg_length.into());
    properties.insert("median_length".to_string(), summary.median_length.into());
    properties.insert("outage_count".to_string(), summary.outage_count.into());
    properties
}

/// Writes the summary table (no geometry) as CSV. Absent statistics are
/// empty cells.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the file cannot be created or written.
pub fn write_summary_csv(path: &Path, summaries: &[ParcelSummary]) -> Result<(), AnalyticsError> {
    let mut writer = csv::Writer::from_writer(create(path)?);
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush().map_err(|source| AnalyticsError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!("Wrote summary table to {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct EventRow {
    landuse_id: usize,
    event_id: u32,
    start: i64,
    end: i64,
    length: i64,
}

/// Writes every event as a CSV row of
/// `landuse_id,event_id,start,end,length`.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the file cannot be created or written.
pub fn write_events_csv(path: &Path, events: &[OutageEvent]) -> Result<(), AnalyticsError> {
    let mut writer = csv::Writer::from_writer(create(path)?);
    for event in events {
        writer.serialize(EventRow {
            landuse_id: event.landuse_id,
            event_id: event.event_id,
            start: event.start,
            end: event.end,
            length: event.duration_hours,
        })?;
    }
    writer.flush().map_err(|source| AnalyticsError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!("Wrote {} events to {}", events.len(), path.display());
    Ok(())
}

/// Creates `path` (and its parent directory) for buffered writing.
fn create(path: &Path) -> Result<BufWriter<File>, AnalyticsError> {
    let io_error = |source: std::io::Error| AnalyticsError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).map_err(io_error)?;
    }
    File::create(path).map(BufWriter::new).map_err(io_error)
}
