//! Coalescing of per-parcel outage intervals into events.
//!
//! Several outage jobs often describe the same disruption at a parcel:
//! crews split a circuit into jobs, or an area outage overlaps a point
//! outage. Any jobs whose intervals overlap or touch become one event.

use std::cmp::Ordering;

use outage_map_outage_models::{OutageEvent, OutageRecord, hours_between};

/// Orders records the way [`coalesce`] expects: by start time ascending,
/// records without a start last, ties broken by job id.
pub fn sort_for_coalescing(records: &mut [&OutageRecord]) {
    records.sort_by(|a, b| coalescing_order(a, b));
}

fn coalescing_order(a: &OutageRecord, b: &OutageRecord) -> Ordering {
    let by_start = match (a.start, b.start) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_start.then_with(|| a.job_id.cmp(&b.job_id))
}

/// An event under construction.
struct Window {
    start: i64,
    end: i64,
    job_ids: Vec<String>,
}

impl Window {
    fn open(job_id: &str, start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            job_ids: vec![job_id.to_string()],
        }
    }

    /// Whether an interval starting at `start` overlaps or touches this one.
    const fn reaches(&self, start: i64) -> bool {
        start <= self.end
    }

    fn extend(&mut self, job_id: &str, end: i64) {
        self.end = self.end.max(end);
        self.job_ids.push(job_id.to_string());
    }
}

/// Merges one parcel's records into non-overlapping events.
///
/// `records` must already be sorted with [`sort_for_coalescing`]. A record
/// missing its start or end cannot be placed on the timeline, so it is
/// skipped: it neither opens an event nor extends one. Emitted events are
/// numbered from 1 in time order.
#[must_use]
pub fn coalesce(landuse_id: usize, records: &[&OutageRecord]) -> Vec<OutageEvent> {
    debug_assert!(
        records.is_sorted_by(|a, b| coalescing_order(a, b) != Ordering::Greater),
        "coalesce requires records sorted by sort_for_coalescing"
    );

    let mut windows: Vec<Window> = Vec::new();

    for record in records {
        let (Some(start), Some(end)) = (record.start, record.end) else {
            log::debug!(
                "Skipping job {} at parcel {landuse_id}: missing start or end",
                record.job_id
            );
            continue;
        };
        match windows.last_mut() {
            Some(window) if window.reaches(start) => window.extend(&record.job_id, end),
            _ => windows.push(Window::open(&record.job_id, start, end)),
        }
    }

    let mut event_id = 0;
    windows
        .into_iter()
        .filter_map(|window| {
            let Some(duration_hours) = hours_between(window.start, window.end) else {
                log::warn!(
                    "Dropping event at parcel {landuse_id} (jobs {:?}): span out of range",
                    window.job_ids
                );
                return None;
            };
            event_id += 1;
            Some(OutageEvent {
                landuse_id,
                event_id,
                start: window.start,
                end: window.end,
                duration_hours,
                job_ids: window.job_ids,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use outage_map_outage_models::MILLIS_PER_HOUR;

    use super::*;

    fn record(job_id: &str, start: Option<i64>, end: Option<i64>) -> OutageRecord {
        OutageRecord {
            job_id: job_id.to_string(),
            start: start.map(|h| h * MILLIS_PER_HOUR),
            end: end.map(|h| h * MILLIS_PER_HOUR),
            duration_hours: None,
            geometry: None,
        }
    }

    fn run(records: &[OutageRecord]) -> Vec<OutageEvent> {
        let mut refs: Vec<&OutageRecord> = records.iter().collect();
        sort_for_coalescing(&mut refs);
        coalesce(7, &refs)
    }

    fn spans(events: &[OutageEvent]) -> Vec<(i64, i64)> {
        events
            .iter()
            .map(|e| (e.start / MILLIS_PER_HOUR, e.end / MILLIS_PER_HOUR))
            .collect()
    }

    #[test]
    fn overlapping_intervals_merge() {
        let events = run(&[
            record("A", Some(0), Some(10)),
            record("B", Some(5), Some(15)),
            record("C", Some(20), Some(30)),
        ]);

        assert_eq!(spans(&events), [(0, 15), (20, 30)]);
        assert_eq!(events[0].duration_hours, 15);
        assert_eq!(events[1].duration_hours, 10);
        assert_eq!(events[0].job_ids, ["A", "B"]);
        assert_eq!(events[1].job_ids, ["C"]);
        assert_eq!(
            events.iter().map(|e| e.event_id).collect::<Vec<_>>(),
            [1, 2]
        );
        assert!(events.iter().all(|e| e.landuse_id == 7));
    }

    #[test]
    fn touching_intervals_merge() {
        let events = run(&[record("A", Some(0), Some(10)), record("B", Some(10), Some(20))]);
        assert_eq!(spans(&events), [(0, 20)]);
        assert_eq!(events[0].duration_hours, 20);
    }

    #[test]
    fn contained_interval_does_not_shrink_event() {
        let events = run(&[record("A", Some(0), Some(20)), record("B", Some(5), Some(10))]);
        assert_eq!(spans(&events), [(0, 20)]);
    }

    #[test]
    fn unsorted_input_is_ordered_first() {
        let events = run(&[
            record("C", Some(20), Some(30)),
            record("B", Some(5), Some(15)),
            record("A", Some(0), Some(10)),
        ]);
        assert_eq!(spans(&events), [(0, 15), (20, 30)]);
    }

    #[test]
    fn equal_starts_break_ties_by_job_id() {
        let events = run(&[record("Z", Some(0), Some(4)), record("M", Some(0), Some(2))]);
        assert_eq!(events[0].job_ids, ["M", "Z"]);
        assert_eq!(spans(&events), [(0, 4)]);
    }

    #[test]
    fn record_without_end_leaves_overlapped_event_intact() {
        let events = run(&[record("A", Some(0), Some(10)), record("B", Some(5), None)]);
        assert_eq!(spans(&events), [(0, 10)]);
        assert_eq!(events[0].job_ids, ["A"]);
        assert_eq!(events[0].duration_hours, 10);
    }

    #[test]
    fn record_without_end_does_not_bridge_events() {
        let events = run(&[
            record("A", Some(0), Some(10)),
            record("B", Some(20), None),
            record("C", Some(25), Some(30)),
        ]);
        assert_eq!(spans(&events), [(0, 10), (25, 30)]);
        assert_eq!(events[1].job_ids, ["C"]);
        assert_eq!(
            events.iter().map(|e| e.event_id).collect::<Vec<_>>(),
            [1, 2]
        );
    }

    #[test]
    fn open_outage_does_not_block_later_events() {
        let events = run(&[record("A", Some(0), None), record("B", Some(50), Some(60))]);
        assert_eq!(spans(&events), [(50, 60)]);
        assert_eq!(events[0].event_id, 1);
    }

    #[test]
    fn only_incomplete_records_yield_no_events() {
        let events = run(&[record("A", Some(0), None), record("B", None, Some(5))]);
        assert!(events.is_empty());
    }

    #[test]
    fn record_without_start_never_extends_an_event() {
        let events = run(&[record("A", Some(0), Some(10)), record("B", None, Some(40))]);
        assert_eq!(spans(&events), [(0, 10)]);
        assert_eq!(events[0].job_ids, ["A"]);
    }

    #[test]
    fn event_ids_skip_nothing_after_drops() {
        let events = run(&[
            record("A", Some(0), Some(1)),
            record("B", Some(5), Some(6)),
            record("C", None, None),
        ]);
        assert_eq!(
            events.iter().map(|e| e.event_id).collect::<Vec<_>>(),
            [1, 2]
        );
    }

    #[test]
    fn no_records_no_events() {
        assert!(coalesce(0, &[]).is_empty());
    }

    #[test]
    fn events_are_strictly_ordered_and_disjoint() {
        let events = run(&[
            record("A", Some(0), Some(3)),
            record("B", Some(2), Some(8)),
            record("C", Some(9), Some(9)),
            record("D", Some(9), Some(12)),
            record("E", Some(13), Some(14)),
        ]);
        assert_eq!(spans(&events), [(0, 8), (9, 12), (13, 14)]);
        for pair in events.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn duration_floors_partial_hours() {
        let a = OutageRecord {
            job_id: "A".to_string(),
            start: Some(0),
            end: Some(3 * MILLIS_PER_HOUR - 1),
            duration_hours: None,
            geometry: None,
        };
        let events = coalesce(0, &[&a]);
        assert_eq!(events[0].duration_hours, 2);
    }

    #[test]
    fn span_too_wide_for_hours_is_dropped() {
        let a = OutageRecord {
            job_id: "A".to_string(),
            start: Some(i64::MIN),
            end: Some(i64::MAX),
            duration_hours: None,
            geometry: None,
        };
        let b = OutageRecord {
            job_id: "B".to_string(),
            start: Some(i64::MAX),
            end: Some(i64::MAX),
            duration_hours: None,
            geometry: None,
        };
        assert!(coalesce(0, &[&a]).is_empty());
        assert_eq!(coalesce(0, &[&b]).len(), 1);
    }
}
