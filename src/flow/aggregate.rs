//! On-demand aggregation over the flow record sequence.
//!
//! Both queries recompute fully from a snapshot on every call. Call frequency
//! is user-triggered, not per-record, so no incremental index is kept. An
//! empty record sequence yields empty results; callers treat "nothing to
//! display" as a normal outcome.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use super::{FlowLog, FlowRecord};

/// Connection count for one exact (source, destination) pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PairCount {
    pub source_ip: String,
    pub dest_ip: String,
    pub count: u64,
}

/// Observed connection count within one minute-wide bucket.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BucketCount {
    pub bucket_start: DateTime<Utc>,
    pub count: u64,
}

/// Read-only aggregate queries over a live [`FlowLog`].
#[derive(Debug, Clone)]
pub struct FlowAggregator {
    log: Arc<FlowLog>,
}

impl FlowAggregator {
    pub fn new(log: Arc<FlowLog>) -> Self {
        Self { log }
    }

    /// Counts records per exact (source, destination) pair.
    pub fn pair_counts(&self) -> Vec<PairCount> {
        pair_counts(&self.log.snapshot())
    }

    /// Groups records into per-minute buckets per connection label.
    pub fn time_buckets(&self) -> HashMap<String, Vec<BucketCount>> {
        time_buckets(&self.log.snapshot())
    }

    /// Like [`FlowAggregator::time_buckets`], but zero-fills the minutes
    /// between each label's first and last observed bucket, producing the
    /// dense matrix a heatmap consumer needs.
    pub fn dense_time_buckets(&self) -> HashMap<String, Vec<BucketCount>> {
        let mut buckets = time_buckets(&self.log.snapshot());
        for series in buckets.values_mut() {
            *series = zero_fill(series);
        }
        buckets
    }
}

/// Counts records by exact (source, destination) equality.
///
/// Output order is unspecified; consumers sort as needed.
pub fn pair_counts(records: &[FlowRecord]) -> Vec<PairCount> {
    let mut counts: HashMap<(&str, &str), u64> = HashMap::new();
    for record in records {
        *counts
            .entry((record.source_ip.as_str(), record.dest_ip.as_str()))
            .or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((source_ip, dest_ip), count)| PairCount {
            source_ip: source_ip.to_owned(),
            dest_ip: dest_ip.to_owned(),
            count,
        })
        .collect()
}

/// Groups records by connection label and minute bucket.
///
/// Each label's buckets are ordered by time; minutes with no records are
/// absent (see [`FlowAggregator::dense_time_buckets`] for the zero-filled
/// form).
pub fn time_buckets(records: &[FlowRecord]) -> HashMap<String, Vec<BucketCount>> {
    let mut grouped: HashMap<String, HashMap<DateTime<Utc>, u64>> = HashMap::new();
    for record in records {
        *grouped
            .entry(record.connection_label())
            .or_default()
            .entry(minute_bucket(record.timestamp))
            .or_default() += 1;
    }

    grouped
        .into_iter()
        .map(|(label, buckets)| {
            let mut series: Vec<BucketCount> = buckets
                .into_iter()
                .map(|(bucket_start, count)| BucketCount { bucket_start, count })
                .collect();
            series.sort_by_key(|bucket| bucket.bucket_start);
            (label, series)
        })
        .collect()
}

/// Truncates an instant to the start of its minute.
fn minute_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(TimeDelta::minutes(1))
        .unwrap_or(timestamp)
}

/// Fills absent minutes between the first and last bucket with zero counts.
fn zero_fill(series: &[BucketCount]) -> Vec<BucketCount> {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Vec::new();
    };

    let by_start: HashMap<DateTime<Utc>, u64> = series
        .iter()
        .map(|bucket| (bucket.bucket_start, bucket.count))
        .collect();

    let mut filled = Vec::new();
    let mut cursor = first.bucket_start;
    while cursor <= last.bucket_start {
        filled.push(BucketCount {
            bucket_start: cursor,
            count: by_start.get(&cursor).copied().unwrap_or(0),
        });
        cursor = cursor + TimeDelta::minutes(1);
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    fn record(ts: DateTime<Utc>, src: &str, dst: &str) -> FlowRecord {
        FlowRecord::new(ts, src.to_owned(), dst.to_owned())
    }

    #[test]
    fn test_pair_counts_groups_by_exact_pair() {
        let records = vec![
            record(at(12, 0, 1), "A", "B"),
            record(at(12, 0, 2), "A", "B"),
            record(at(12, 0, 3), "C", "D"),
        ];

        let mut counts = pair_counts(&records);
        counts.sort_by(|a, b| a.source_ip.cmp(&b.source_ip));

        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].source_ip, "A");
        assert_eq!(counts[0].count, 2);
        assert_eq!(counts[1].source_ip, "C");
        assert_eq!(counts[1].count, 1);
    }

    #[test]
    fn test_pair_counts_direction_matters() {
        let records = vec![
            record(at(12, 0, 1), "A", "B"),
            record(at(12, 0, 2), "B", "A"),
        ];
        assert_eq!(pair_counts(&records).len(), 2);
    }

    #[test]
    fn test_pair_counts_empty() {
        assert!(pair_counts(&[]).is_empty());
    }

    #[test]
    fn test_time_buckets_same_minute_share_a_bucket() {
        let records = vec![
            record(at(12, 0, 5), "A", "B"),
            record(at(12, 0, 55), "A", "B"),
            record(at(12, 1, 5), "A", "B"),
        ];

        let buckets = time_buckets(&records);
        let series = &buckets["A->B"];

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].bucket_start, at(12, 0, 0));
        assert_eq!(series[0].count, 2);
        assert_eq!(series[1].bucket_start, at(12, 1, 0));
        assert_eq!(series[1].count, 1);
    }

    #[test]
    fn test_time_buckets_sparse_minutes_absent() {
        let records = vec![
            record(at(12, 0, 10), "A", "B"),
            record(at(12, 3, 10), "A", "B"),
        ];

        let buckets = time_buckets(&records);
        assert_eq!(buckets["A->B"].len(), 2);
    }

    #[test]
    fn test_dense_time_buckets_zero_fills_gaps() {
        let log = Arc::new(FlowLog::default());
        log.push(record(at(12, 0, 10), "A", "B"));
        log.push(record(at(12, 3, 10), "A", "B"));

        let dense = FlowAggregator::new(log).dense_time_buckets();
        let series = &dense["A->B"];

        assert_eq!(series.len(), 4);
        assert_eq!(series[0].count, 1);
        assert_eq!(series[1].count, 0);
        assert_eq!(series[1].bucket_start, at(12, 1, 0));
        assert_eq!(series[2].count, 0);
        assert_eq!(series[3].count, 1);
    }

    #[test]
    fn test_empty_log_yields_empty_results() {
        let aggregator = FlowAggregator::new(Arc::new(FlowLog::default()));
        assert!(aggregator.pair_counts().is_empty());
        assert!(aggregator.time_buckets().is_empty());
        assert!(aggregator.dense_time_buckets().is_empty());
    }
}
