//! Summary statistics over a sample sequence.
//!
//! Statistics are computed independently for the client and the server
//! dimension of [`DualDuration`]. All arithmetic is done on integer
//! nanoseconds, so the result does not depend on the order of the samples.
//! An empty sequence yields the all-zero value; the computation never fails.

use crate::types::{DualDuration, Record, RecordSet, nanos};
use serde::Serialize;
use std::time::Duration;

/// Statistics for one duration dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurationStats {
    #[serde(with = "nanos")]
    pub min: Duration,
    #[serde(with = "nanos")]
    pub max: Duration,
    /// Truncating integer mean.
    #[serde(with = "nanos")]
    pub mean: Duration,
    #[serde(with = "nanos")]
    pub median: Duration,
    /// Population variance in squared nanoseconds.
    pub dispersion_nanos2: u128,
    /// Square root of the dispersion, truncated to whole nanoseconds.
    #[serde(with = "nanos")]
    pub std_dev: Duration,
}

impl DurationStats {
    pub fn min_ms(&self) -> f64 {
        as_ms(self.min)
    }

    pub fn max_ms(&self) -> f64 {
        as_ms(self.max)
    }

    pub fn mean_ms(&self) -> f64 {
        as_ms(self.mean)
    }

    pub fn median_ms(&self) -> f64 {
        as_ms(self.median)
    }

    pub fn std_dev_ms(&self) -> f64 {
        as_ms(self.std_dev)
    }
}

/// Statistics for both dimensions of a sample sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub client: DurationStats,
    pub server: DurationStats,
}

impl Stats {
    pub fn compute(samples: &[DualDuration]) -> Self {
        Self {
            client: duration_stats(samples.iter().map(|s| s.client_duration)),
            server: duration_stats(samples.iter().map(|s| s.server_duration)),
        }
    }
}

/// A record together with the statistics of its burst.
#[derive(Debug, Clone, Serialize)]
pub struct StatsRecord<'a> {
    pub record: &'a Record,
    pub stats: Stats,
}

/// Compute statistics for every record of a run, preserving unit order.
pub fn analyze(records: &RecordSet) -> Vec<StatsRecord<'_>> {
    records
        .iter()
        .map(|record| StatsRecord {
            record,
            stats: Stats::compute(&record.execution_times),
        })
        .collect()
}

/// Convert a duration to fractional milliseconds.
pub fn as_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1e6
}

fn duration_stats(values: impl Iterator<Item = Duration>) -> DurationStats {
    let mut nanos: Vec<u128> = values.map(|d| d.as_nanos()).collect();
    if nanos.is_empty() {
        return DurationStats::default();
    }

    let count = nanos.len() as u128;
    let mut min = nanos[0];
    let mut max = nanos[0];
    let mut sum = 0u128;
    for &value in &nanos {
        min = min.min(value);
        max = max.max(value);
        sum += value;
    }
    let mean = sum / count;

    // Second pass: population variance, not sample variance.
    let squares: u128 = nanos
        .iter()
        .map(|&value| {
            let diff = value.abs_diff(mean);
            diff.saturating_mul(diff)
        })
        .fold(0u128, u128::saturating_add);
    let dispersion = squares / count;
    let std_dev = (dispersion as f64).sqrt() as u128;

    nanos.sort_unstable();
    let mid = nanos.len() / 2;
    let median = if nanos.len() % 2 == 0 {
        let lower = nanos[mid - 1];
        let upper = nanos[mid];
        lower + (upper - lower) / 2
    } else {
        nanos[mid]
    };

    DurationStats {
        min: from_nanos(min),
        max: from_nanos(max),
        mean: from_nanos(mean),
        median: from_nanos(median),
        dispersion_nanos2: dispersion,
        std_dev: from_nanos(std_dev),
    }
}

fn from_nanos(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
