// ============================================================================
// ANALYSIS AGGREGATOR
// ============================================================================
// Daily breakdowns keyed by the calendar day (UTC) of each record's start.
// Each day is swept on its own, so the overall peak is the largest daily
// peak. Overlaps that cross midnight are not compared across days, which
// can undercount the true global peak.
// ============================================================================

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::UNKNOWN_DIMENSION;
use crate::filter::RowIdSet;
use crate::store::{RecordStore, StandardField};
use crate::sweep::sweep;
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub date: NaiveDate,
    pub domain: String,
    pub channel: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleTimePoint {
    pub date: NaiveDate,
    pub avg_handle_time_secs: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainmentPoint {
    pub date: NaiveDate,
    pub contained: usize,
    pub total: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyPoint {
    pub date: NaiveDate,
    pub peak: u32,
    pub average: f64,
}

/// All series are ascending by date, volume additionally by domain then
/// channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub volume_by_domain_channel_day: Vec<VolumePoint>,
    pub handle_time_by_day: Vec<HandleTimePoint>,
    pub containment_rate_by_day: Vec<ContainmentPoint>,
    pub concurrency_by_day: Vec<ConcurrencyPoint>,
    /// Maximum of the daily peaks
    pub overall_peak_concurrency: u32,
    /// Contained share of every row in the subset, dated or not
    pub overall_containment_rate: f64,
}

#[derive(Default)]
struct DayBucket {
    total: usize,
    contained: usize,
    handle_ms: i64,
    intervals: Vec<(Timestamp, Timestamp)>,
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Daily breakdown of a row subset.
pub fn analyze(store: &RecordStore, rows: &RowIdSet) -> AnalysisReport {
    let mut days: BTreeMap<NaiveDate, DayBucket> = BTreeMap::new();
    let mut volume: BTreeMap<(NaiveDate, String, String), usize> = BTreeMap::new();
    let mut population = 0usize;
    let mut contained = 0usize;

    for row in rows.iter() {
        let Some(record) = store.record(row) else {
            continue;
        };
        population += 1;
        if record.is_contained() {
            contained += 1;
        }

        let Some(start) = record.start() else {
            continue;
        };
        let date = start.date();
        let bucket = days.entry(date).or_default();
        bucket.total += 1;
        if record.is_contained() {
            bucket.contained += 1;
        }
        if let Some((start, end)) = record.interval() {
            bucket.handle_ms += end.as_millis() - start.as_millis();
            bucket.intervals.push((start, end));
        }

        let domain = record.known(StandardField::Domain).unwrap_or(UNKNOWN_DIMENSION);
        let channel = record.known(StandardField::Channel).unwrap_or(UNKNOWN_DIMENSION);
        *volume
            .entry((date, domain.to_string(), channel.to_string()))
            .or_default() += 1;
    }

    let mut report = AnalysisReport {
        volume_by_domain_channel_day: volume
            .into_iter()
            .map(|((date, domain, channel), count)| VolumePoint {
                date,
                domain,
                channel,
                count,
            })
            .collect(),
        overall_containment_rate: ratio(contained, population),
        ..AnalysisReport::default()
    };

    for (date, bucket) in days {
        let samples = bucket.intervals.len();
        report.handle_time_by_day.push(HandleTimePoint {
            date,
            avg_handle_time_secs: if samples == 0 {
                0.0
            } else {
                bucket.handle_ms as f64 / samples as f64 / 1000.0
            },
            samples,
        });
        report.containment_rate_by_day.push(ContainmentPoint {
            date,
            contained: bucket.contained,
            total: bucket.total,
            rate: ratio(bucket.contained, bucket.total),
        });

        let concurrency = sweep(bucket.intervals);
        report.overall_peak_concurrency = report.overall_peak_concurrency.max(concurrency.peak);
        report.concurrency_by_day.push(ConcurrencyPoint {
            date,
            peak: concurrency.peak,
            average: concurrency.average,
        });
    }

    debug!(
        target: "convolens::analysis",
        rows = population,
        days = report.concurrency_by_day.len(),
        peak = report.overall_peak_concurrency,
        "Analysis computed"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::store::tests::sample_store;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_daily_series() {
        let store = sample_store();
        let report = analyze(&store, &store.all_rows());

        assert_eq!(
            report.volume_by_domain_channel_day,
            vec![
                VolumePoint { date: day(1), domain: "Billing".into(), channel: "Chat".into(), count: 1 },
                VolumePoint { date: day(1), domain: "Billing".into(), channel: "Voice".into(), count: 1 },
                VolumePoint { date: day(1), domain: "Tech".into(), channel: "Chat".into(), count: 1 },
                VolumePoint { date: day(2), domain: "Tech".into(), channel: "Voice".into(), count: 1 },
            ]
        );
        assert_eq!(report.concurrency_by_day.len(), 2);
        assert_eq!(report.concurrency_by_day[0].peak, 2);
        assert_eq!(report.concurrency_by_day[1].peak, 1);
        assert_eq!(report.overall_peak_concurrency, 2);
        assert_eq!(report.containment_rate_by_day[0].contained, 2);
        assert_eq!(report.containment_rate_by_day[1].rate, 0.0);
        assert_eq!(report.handle_time_by_day[1].avg_handle_time_secs, 1800.0);
        assert_eq!(report.overall_containment_rate, 0.5);
    }

    #[test]
    fn test_missing_dimensions_are_unknown() {
        let data = "start_time,end_time,domain\n2024-01-01T10:00,2024-01-01T10:05,\n";
        let (store, _) = RecordStore::ingest(data.as_bytes(), &SchemaConfig::default()).unwrap();
        let report = analyze(&store, &store.all_rows());
        assert_eq!(report.volume_by_domain_channel_day[0].domain, UNKNOWN_DIMENSION);
        assert_eq!(report.volume_by_domain_channel_day[0].channel, UNKNOWN_DIMENSION);
    }

    #[test]
    fn test_cross_midnight_overlap_is_not_compared_across_days() {
        let data = "\
start_time,end_time
2024-01-01T23:50,2024-01-02T00:30
2024-01-02T00:10,2024-01-02T00:20
";
        let (store, _) = RecordStore::ingest(data.as_bytes(), &SchemaConfig::default()).unwrap();
        let report = analyze(&store, &store.all_rows());
        assert_eq!(report.overall_peak_concurrency, 1);
        assert_eq!(crate::sweep::summarize(&store, &store.all_rows()).peak_concurrency, 2);
    }

    #[test]
    fn test_empty_subset() {
        let store = sample_store();
        assert_eq!(analyze(&store, &RowIdSet::empty()), AnalysisReport::default());
    }
}
