//! Pairing and relative difference between two runs.
//!
//! Units are matched by id. Units present in only one run are dropped, so a
//! report over mismatched historical runs still renders.

use crate::stats::{DurationStats, Stats};
use crate::types::{Record, RecordSet};
use serde::Serialize;

/// Relative differences above this percentage are significant.
pub const SIGNIFICANCE_THRESHOLD_PERCENT: f64 = 5.0;

/// Substitute for a zero baseline when computing relative differences.
pub const ZERO_BASELINE_EPSILON: f64 = 1e-6;

/// Two records sharing a unit id across two runs.
#[derive(Debug, Clone, Copy)]
pub struct RecordPair<'a> {
    pub lhs: &'a Record,
    pub rhs: &'a Record,
}

impl RecordPair<'_> {
    pub fn unit_id(&self) -> u64 {
        self.lhs.unit_id
    }
}

/// Pair every rhs unit that also exists in lhs, ascending by unit id.
pub fn pair_records<'a>(lhs: &'a RecordSet, rhs: &'a RecordSet) -> Vec<RecordPair<'a>> {
    let mut pairs: Vec<RecordPair<'a>> = rhs
        .iter()
        .filter_map(|rhs_record| {
            lhs.get(rhs_record.unit_id)
                .map(|lhs_record| RecordPair {
                    lhs: lhs_record,
                    rhs: rhs_record,
                })
        })
        .collect();
    pairs.sort_by_key(|pair| pair.unit_id());
    pairs
}

/// `(rhs - lhs) / lhs * 100`, with a zero `lhs` divisor replaced by a small epsilon.
pub fn relative_difference(lhs: f64, rhs: f64) -> f64 {
    let divisor = if lhs != 0.0 { lhs } else { ZERO_BASELINE_EPSILON };
    (rhs - lhs) / divisor * 100.0
}

/// Direction of a significant change. Larger durations are worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Regression,
    Improvement,
    Unchanged,
}

impl Significance {
    pub fn classify(relative_difference: f64) -> Self {
        if relative_difference.abs() > SIGNIFICANCE_THRESHOLD_PERCENT {
            if relative_difference > 0.0 {
                Self::Regression
            } else {
                Self::Improvement
            }
        } else {
            Self::Unchanged
        }
    }

    pub fn is_significant(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl std::fmt::Display for Significance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regression => write!(f, "regression"),
            Self::Improvement => write!(f, "improvement"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Median comparison for one duration dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MedianDiff {
    pub lhs_ms: f64,
    pub rhs_ms: f64,
    pub relative_percent: f64,
    pub significance: Significance,
}

impl MedianDiff {
    pub fn between(lhs: &DurationStats, rhs: &DurationStats) -> Self {
        let lhs_ms = lhs.median_ms();
        let rhs_ms = rhs.median_ms();
        let relative_percent = relative_difference(lhs_ms, rhs_ms);
        Self {
            lhs_ms,
            rhs_ms,
            relative_percent,
            significance: Significance::classify(relative_percent),
        }
    }
}

/// Comparison of one unit across two runs.
#[derive(Debug, Clone, Serialize)]
pub struct UnitDiff {
    pub unit_id: u64,
    pub unit: String,
    pub lhs: Stats,
    pub rhs: Stats,
    pub client: MedianDiff,
    pub server: MedianDiff,
}

impl UnitDiff {
    pub fn from_pair(pair: &RecordPair<'_>) -> Self {
        let lhs = Stats::compute(&pair.lhs.execution_times);
        let rhs = Stats::compute(&pair.rhs.execution_times);
        Self {
            unit_id: pair.unit_id(),
            unit: pair.rhs.unit.clone(),
            client: MedianDiff::between(&lhs.client, &rhs.client),
            server: MedianDiff::between(&lhs.server, &rhs.server),
            lhs,
            rhs,
        }
    }
}

/// Counts of significant changes across a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub units: usize,
    pub client_regressions: usize,
    pub client_improvements: usize,
    pub server_regressions: usize,
    pub server_improvements: usize,
}

impl DiffSummary {
    pub fn from_diffs(diffs: &[UnitDiff]) -> Self {
        let mut summary = Self {
            units: diffs.len(),
            ..Self::default()
        };
        for diff in diffs {
            match diff.client.significance {
                Significance::Regression => summary.client_regressions += 1,
                Significance::Improvement => summary.client_improvements += 1,
                Significance::Unchanged => {}
            }
            match diff.server.significance {
                Significance::Regression => summary.server_regressions += 1,
                Significance::Improvement => summary.server_improvements += 1,
                Significance::Unchanged => {}
            }
        }
        summary
    }
}

/// Pair two runs and compare every shared unit.
pub fn diff_runs(lhs: &RecordSet, rhs: &RecordSet) -> Vec<UnitDiff> {
    pair_records(lhs, rhs)
        .iter()
        .map(UnitDiff::from_pair)
        .collect()
}
