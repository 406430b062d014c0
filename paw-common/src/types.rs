//! Common types shared by the recorder and the report stage.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One measurement of a unit of work.
///
/// `client_duration` is the wall time observed by the caller, `server_duration`
/// the time reported by the backend itself. The two may diverge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualDuration {
    #[serde(with = "nanos")]
    pub client_duration: Duration,
    #[serde(with = "nanos")]
    pub server_duration: Duration,
}

impl DualDuration {
    pub fn new(client_duration: Duration, server_duration: Duration) -> Self {
        Self {
            client_duration,
            server_duration,
        }
    }
}

/// Durations are persisted as integer nanoseconds.
pub mod nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

/// Kind of an artifact produced by a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Rendered SVG flamegraph.
    Flamegraph,
    /// Folded stacks (`frame;frame;frame count` per line).
    FoldedStacks,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flamegraph => write!(f, "flamegraph"),
            Self::FoldedStacks => write!(f, "folded_stacks"),
        }
    }
}

/// A file written by a collector, relative to its output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub name: String,
}

impl ArtifactFile {
    pub fn new(kind: ArtifactKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Outcome of one collector invocation for one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorResult {
    /// Name of the collector that produced this result.
    pub name: String,
    /// Declared artifact files.
    pub files: Vec<ArtifactFile>,
    /// Samples gathered while the profiling session was live.
    #[serde(rename = "execution_times")]
    pub samples: Vec<DualDuration>,
}

impl CollectorResult {
    pub fn new(name: impl Into<String>, files: Vec<ArtifactFile>) -> Self {
        Self {
            name: name.into(),
            files,
            samples: Vec::new(),
        }
    }
}

/// Full result for one unit of work. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub unit_id: u64,
    pub unit: String,
    pub execution_times: Vec<DualDuration>,
    #[serde(default)]
    pub collector_results: Vec<CollectorResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordSetError {
    #[error("unit {0} appears more than once in the run")]
    DuplicateUnit(u64),
}

/// Records of one run, sorted ascending by unit id, ids unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecordSet(Vec<Record>);

impl RecordSet {
    pub fn new(mut records: Vec<Record>) -> Result<Self, RecordSetError> {
        records.sort_by_key(|record| record.unit_id);
        if let Some(pair) = records.windows(2).find(|w| w[0].unit_id == w[1].unit_id) {
            return Err(RecordSetError::DuplicateUnit(pair[0].unit_id));
        }
        Ok(Self(records))
    }

    pub fn records(&self) -> &[Record] {
        &self.0
    }

    pub fn get(&self, unit_id: u64) -> Option<&Record> {
        self.0
            .binary_search_by_key(&unit_id, |record| record.unit_id)
            .ok()
            .map(|idx| &self.0[idx])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Record> {
        self.0
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(unit_id: u64) -> Record {
        Record {
            unit_id,
            unit: format!("SELECT {unit_id}"),
            execution_times: vec![DualDuration::new(
                Duration::from_millis(unit_id + 1),
                Duration::from_micros(unit_id),
            )],
            collector_results: Vec::new(),
        }
    }

    #[test]
    fn test_record_json_uses_integer_nanoseconds() {
        let json = serde_json::to_value(record(2)).unwrap();
        assert_eq!(json["unit_id"], 2);
        assert_eq!(json["execution_times"][0]["client_duration"], 3_000_000);
        assert_eq!(json["execution_times"][0]["server_duration"], 2_000);
    }

    #[test]
    fn test_record_round_trip_with_collectors() {
        let mut original = record(7);
        let mut result = CollectorResult::new(
            "cpu_flamegraph",
            vec![
                ArtifactFile::new(ArtifactKind::Flamegraph, "cpu_flamegraph.svg"),
                ArtifactFile::new(ArtifactKind::FoldedStacks, "cpu_flamegraph.folded"),
            ],
        );
        result.samples.push(DualDuration::new(
            Duration::from_nanos(123_456_789),
            Duration::from_nanos(98_765),
        ));
        original.collector_results.push(result);

        let json = serde_json::to_string_pretty(&original).unwrap();
        assert!(json.contains("\"type\": \"folded_stacks\""));
        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_record_set_sorts_by_unit_id() {
        let set = RecordSet::new(vec![record(3), record(0), record(1)]).unwrap();
        let ids: Vec<u64> = set.iter().map(|r| r.unit_id).collect();
        assert_eq!(ids, vec![0, 1, 3]);
        assert_eq!(set.get(3).map(|r| r.unit_id), Some(3));
        assert!(set.get(2).is_none());
    }

    #[test]
    fn test_record_set_rejects_duplicates() {
        let err = RecordSet::new(vec![record(1), record(4), record(1)]).unwrap_err();
        assert_eq!(err, RecordSetError::DuplicateUnit(1));
    }
}
