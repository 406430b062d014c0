//! Shared helpers for paw-common integration tests.

#![allow(dead_code)]

use paw_common::store::{prepare_unit_dir, record_path, write_record};
use paw_common::{DualDuration, Record};
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

static INIT: Once = Once::new();

/// Route `tracing` output through the test harness writer.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A record whose three samples surround `median_ms`; server time is half the client time.
pub fn record_around(unit_id: u64, median_ms: u64) -> Record {
    let execution_times = [median_ms - 1, median_ms, median_ms + 1]
        .iter()
        .map(|&ms| DualDuration::new(Duration::from_millis(ms), Duration::from_millis(ms / 2)))
        .collect();
    Record {
        unit_id,
        unit: format!("SELECT sleep({unit_id})"),
        execution_times,
        collector_results: Vec::new(),
    }
}

/// Persist one record per `(unit_id, median_ms)` into `dir`.
pub fn write_run(dir: &Path, units: &[(u64, u64)]) {
    for &(unit_id, median_ms) in units {
        prepare_unit_dir(dir, unit_id).unwrap();
        write_record(&record_path(dir, unit_id), &record_around(unit_id, median_ms)).unwrap();
    }
}
