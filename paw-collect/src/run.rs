//! The measurement run: timed bursts, then collectors, one unit at a time.
//!
//! Any executor or collector error aborts the run. Records of units finished
//! before the failure stay on disk; the failing unit gets no record.

use crate::collector::{Collector, CollectorFailure};
use crate::executor::{ExecutionError, Executor};
use paw_common::config::DEFAULT_UNIT_MEASURE_RUNS;
use paw_common::store::{self, StoreError};
use paw_common::{Record, RecordSet, RecordSetError};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("unit {unit_id}: executor failed on call {call}: {source}")]
    Execution {
        unit_id: u64,
        call: u64,
        #[source]
        source: ExecutionError,
    },

    #[error("unit {unit_id}: collector profile '{profile}' failed: {source}")]
    Collector {
        unit_id: u64,
        profile: String,
        #[source]
        source: Box<CollectorFailure>,
    },

    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unit {unit_id} does not exist; the test has {units} units")]
    UnknownUnit { unit_id: u64, units: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    RecordSet(#[from] RecordSetError),
}

/// A collector together with the profile name it was created from.
///
/// The profile name is both the artifact directory under the unit directory
/// and the `name` of the persisted collector result.
pub struct NamedCollector {
    profile: String,
    collector: Box<dyn Collector>,
}

impl NamedCollector {
    pub fn new(profile: impl Into<String>, collector: Box<dyn Collector>) -> Self {
        Self {
            profile: profile.into(),
            collector,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn collector(&self) -> &dyn Collector {
        self.collector.as_ref()
    }
}

/// Progress callbacks for [`MeasurementRun::record_all`].
pub trait RunProgress {
    fn unit_started(&mut self, _unit_id: u64, _unit: &str) {}

    fn unit_finished(&mut self, _record: &Record) {}
}

/// Ignores progress.
pub struct NoProgress;

impl RunProgress for NoProgress {}

pub struct MeasurementRun {
    executor: Box<dyn Executor>,
    collectors: Vec<NamedCollector>,
    repeat: u64,
    output_root: PathBuf,
}

impl MeasurementRun {
    pub fn new(executor: Box<dyn Executor>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            collectors: Vec::new(),
            repeat: DEFAULT_UNIT_MEASURE_RUNS,
            output_root: output_root.into(),
        }
    }

    #[must_use]
    pub fn with_repeat(mut self, repeat: u64) -> Self {
        self.repeat = repeat;
        self
    }

    #[must_use]
    pub fn with_collectors(mut self, collectors: Vec<NamedCollector>) -> Self {
        self.collectors = collectors;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Measure one unit and persist its record.
    pub fn record_unit(&mut self, unit_id: u64, unit: &str) -> Result<Record, RunError> {
        let unit_dir = store::prepare_unit_dir(&self.output_root, unit_id)?;

        debug!(unit_id, runs = self.repeat, "Measuring unit");
        let started = Instant::now();
        let mut execution_times = Vec::with_capacity(self.repeat as usize);
        for call in 0..self.repeat {
            let sample = self
                .executor
                .run(unit)
                .map_err(|source| RunError::Execution {
                    unit_id,
                    call,
                    source,
                })?;
            execution_times.push(sample);
        }
        debug!(
            unit_id,
            samples = execution_times.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished measure runs"
        );

        let mut collector_results = Vec::with_capacity(self.collectors.len());
        for named in &self.collectors {
            let collector_dir = unit_dir.join(&named.profile);
            std::fs::create_dir_all(&collector_dir).map_err(|source| RunError::CreateDir {
                path: collector_dir.clone(),
                source,
            })?;

            debug!(
                unit_id,
                collector = %named.profile,
                dir = %collector_dir.display(),
                "Collecting"
            );
            match named
                .collector
                .collect(self.executor.as_mut(), unit, &collector_dir)
            {
                Ok(mut result) => {
                    result.name = named.profile.clone();
                    debug!(
                        unit_id,
                        collector = %named.profile,
                        samples = result.samples.len(),
                        "Collected"
                    );
                    collector_results.push(result);
                }
                Err(failure) => {
                    warn!(
                        unit_id,
                        collector = %named.profile,
                        samples = failure.partial.samples.len(),
                        error = %failure.source,
                        "Collector failed"
                    );
                    return Err(RunError::Collector {
                        unit_id,
                        profile: named.profile.clone(),
                        source: Box::new(failure),
                    });
                }
            }
        }

        let record = Record {
            unit_id,
            unit: unit.to_string(),
            execution_times,
            collector_results,
        };
        let path = store::record_path(&self.output_root, unit_id);
        store::write_record(&path, &record)?;
        info!(unit_id, path = %path.display(), "Saved unit record");
        Ok(record)
    }

    /// Measure `units` in order, unit id being the index. `only` restricts the
    /// run to a single unit id.
    pub fn record_all(
        &mut self,
        units: &[String],
        only: Option<u64>,
        progress: &mut dyn RunProgress,
    ) -> Result<RecordSet, RunError> {
        if let Some(unit_id) = only.filter(|&id| id >= units.len() as u64) {
            return Err(RunError::UnknownUnit {
                unit_id,
                units: units.len(),
            });
        }

        let mut records = Vec::new();
        for (unit_id, unit) in (0u64..).zip(units) {
            if only.is_some_and(|wanted| wanted != unit_id) {
                continue;
            }
            progress.unit_started(unit_id, unit);
            let record = self.record_unit(unit_id, unit)?;
            progress.unit_finished(&record);
            records.push(record);
        }
        Ok(RecordSet::new(records)?)
    }
}
