// ============================================================================
// SWEEP-LINE AGGREGATOR
// ============================================================================
// Concurrency statistics over start/end intervals. Events are ordered by
// time with starts applied before ends at the same instant, so a record that
// begins exactly when another ends counts as overlapping it and the running
// counter never goes negative.
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::filter::RowIdSet;
use crate::store::RecordStore;
use crate::timestamp::Timestamp;

/// Statistics derived for any row subset. Never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Rows in the subset, including those without usable timing
    pub population: usize,
    pub valid_timing: usize,
    pub invalid_timing: usize,
    pub peak_concurrency: u32,
    /// Time-weighted mean of the running counter over the covered range
    pub avg_concurrency: f64,
    pub avg_handle_time_secs: f64,
    pub contained_count: usize,
    /// Earliest start and latest end among rows with usable timing
    pub time_range: Option<(Timestamp, Timestamp)>,
}

/// Peak and time-weighted average of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Concurrency {
    pub peak: u32,
    pub average: f64,
}

/// Sweep a set of `(start, end)` intervals. Intervals must satisfy
/// `start <= end`.
pub fn sweep<I>(intervals: I) -> Concurrency
where
    I: IntoIterator<Item = (Timestamp, Timestamp)>,
{
    // (instant, 0 = start / 1 = end) sorts starts first at equal instants.
    let mut events: Vec<(i64, u8)> = Vec::new();
    for (start, end) in intervals {
        events.push((start.as_millis(), 0));
        events.push((end.as_millis(), 1));
    }
    if events.is_empty() {
        return Concurrency::default();
    }
    events.sort_unstable();

    let mut counter: i64 = 0;
    let mut peak: i64 = 0;
    let mut weighted: f64 = 0.0;
    let mut previous = events[0].0;

    for &(instant, kind) in &events {
        weighted += counter as f64 * (instant - previous) as f64;
        previous = instant;
        if kind == 0 {
            counter += 1;
            peak = peak.max(counter);
        } else {
            counter -= 1;
        }
    }

    let covered = events[events.len() - 1].0 - events[0].0;
    let average = if covered > 0 {
        weighted / covered as f64
    } else {
        0.0
    };

    Concurrency {
        peak: peak as u32,
        average,
    }
}

/// Summary statistics over a subset of the store.
pub fn summarize(store: &RecordStore, rows: &RowIdSet) -> SummaryStatistics {
    let mut stats = SummaryStatistics::default();
    let mut intervals = Vec::with_capacity(rows.len());
    let mut handle_ms: i64 = 0;

    for row in rows.iter() {
        let Some(record) = store.record(row) else {
            continue;
        };
        stats.population += 1;
        if record.is_contained() {
            stats.contained_count += 1;
        }
        match record.interval() {
            Some((start, end)) => {
                handle_ms += end.as_millis() - start.as_millis();
                stats.time_range = Some(match stats.time_range {
                    Some((lo, hi)) => (lo.min(start), hi.max(end)),
                    None => (start, end),
                });
                intervals.push((start, end));
            }
            None => stats.invalid_timing += 1,
        }
    }

    stats.valid_timing = intervals.len();
    if stats.valid_timing > 0 {
        stats.avg_handle_time_secs = handle_ms as f64 / stats.valid_timing as f64 / 1000.0;
    }

    let concurrency = sweep(intervals);
    stats.peak_concurrency = concurrency.peak;
    stats.avg_concurrency = concurrency.average;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::store::tests::sample_store;
    use proptest::prelude::*;

    fn ts(raw: &str) -> Timestamp {
        Timestamp::parse(raw).unwrap()
    }

    #[test]
    fn test_three_record_example_peaks_at_two() {
        let data = "\
start_time,end_time
2024-01-01T00:00,2024-01-01T00:10
2024-01-01T00:05,2024-01-01T00:15
2024-01-01T00:20,2024-01-01T00:30
";
        let (store, _) = RecordStore::ingest(data.as_bytes(), &SchemaConfig::default()).unwrap();
        let stats = summarize(&store, &store.all_rows());

        assert_eq!(stats.peak_concurrency, 2);
        assert_eq!(stats.valid_timing, 3);
        assert_eq!(stats.avg_handle_time_secs, 600.0);
        assert_eq!(
            stats.time_range,
            Some((ts("2024-01-01T00:00"), ts("2024-01-01T00:30")))
        );
        // 5 min at 1, 5 min at 2, 5 min at 1, 5 min at 0, 10 min at 1 over 30 min
        assert!((stats.avg_concurrency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_back_to_back_counts_as_overlap() {
        let result = sweep([
            (ts("2024-01-01T00:00"), ts("2024-01-01T00:10")),
            (ts("2024-01-01T00:10"), ts("2024-01-01T00:20")),
        ]);
        assert_eq!(result.peak, 2);
    }

    #[test]
    fn test_zero_duration_average_is_zero() {
        let instant = ts("2024-01-01T00:00");
        let result = sweep([(instant, instant), (instant, instant)]);
        assert_eq!(result.peak, 2);
        assert_eq!(result.average, 0.0);
        assert_eq!(sweep(Vec::<(Timestamp, Timestamp)>::new()), Concurrency::default());
    }

    #[test]
    fn test_sample_statistics() {
        let store = sample_store();
        let stats = summarize(&store, &store.all_rows());
        assert_eq!(stats.population, 4);
        assert_eq!(stats.contained_count, 2);
        assert_eq!(stats.invalid_timing, 0);
        assert_eq!(stats.peak_concurrency, 2);

        let empty = summarize(&store, &RowIdSet::empty());
        assert_eq!(empty, SummaryStatistics::default());
    }

    proptest! {
        #[test]
        fn prop_peak_bounds_average(
            spans in proptest::collection::vec((0i64..10_000, 0i64..5_000), 0..40)
        ) {
            let intervals = spans
                .into_iter()
                .map(|(start, len)| (Timestamp::from_millis(start), Timestamp::from_millis(start + len)));
            let result = sweep(intervals);
            prop_assert!(result.average >= 0.0);
            prop_assert!(result.peak as f64 + 1e-9 >= result.average);
        }
    }
}
