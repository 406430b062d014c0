//! Shared types and utilities for the performance workbench.
//!
//! - [`types`]: the persisted data model (samples, collector results, records)
//! - [`stats`]: summary statistics over a sample sequence
//! - [`diff`]: pairing of two runs and relative differences
//! - [`store`]: on-disk layout of a recorded run
//! - [`config`]: configuration and test definition files
//! - [`logging`]: subscriber setup for the binaries

pub mod config;
pub mod diff;
pub mod logging;
pub mod stats;
pub mod store;
pub mod types;

pub use config::{
    CollectorProfile, ConfigError, ExecutorProfile, PawConfig, RunSettings, Settings,
    SettingsError, TestDefinition,
};
pub use diff::{
    DiffSummary, MedianDiff, RecordPair, Significance, UnitDiff, diff_runs, pair_records,
    relative_difference,
};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use stats::{DurationStats, Stats, StatsRecord, analyze};
pub use store::{StoreError, load_run};
pub use types::{
    ArtifactFile, ArtifactKind, CollectorResult, DualDuration, Record, RecordSet, RecordSetError,
};
