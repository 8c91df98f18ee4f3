//! Per-parcel outage statistics.

use std::collections::BTreeSet;

use outage_map_outage_models::{OutageEvent, ParcelSummary};

/// Summarizes one parcel's events.
///
/// With no events every statistic is `None`; a parcel that saw only
/// sub-hour outages still reports `Some(0)` totals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(landuse_id: usize, events: &[OutageEvent]) -> ParcelSummary {
    if events.is_empty() {
        return ParcelSummary::no_data(landuse_id);
    }

    let mut durations: Vec<i64> = events.iter().map(|e| e.duration_hours).collect();
    durations.sort_unstable();

    let total: i64 = durations.iter().sum();
    let distinct_events = events.iter().map(|e| e.event_id).collect::<BTreeSet<_>>();

    ParcelSummary {
        landuse_id,
        total_length: Some(total),
        avg_length: Some(total as f64 / durations.len() as f64),
        median_length: median_of_sorted(&durations),
        outage_count: Some(distinct_events.len() as u64),
    }
}

/// Median of an ascending slice; the mean of the middle pair when even.
#[allow(clippy::cast_precision_loss)]
fn median_of_sorted(values: &[i64]) -> Option<f64> {
    let mid = values.len() / 2;
    match values.len() {
        0 => None,
        n if n % 2 == 1 => Some(values[mid] as f64),
        _ => Some(f64::midpoint(values[mid - 1] as f64, values[mid] as f64)),
    }
}
