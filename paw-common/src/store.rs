//! On-disk layout of a recorded run.
//!
//! ```text
//! <run>/unit_<id>/unit_record.json
//! <run>/unit_<id>/<collector profile>/<artifact files>
//! ```

use crate::types::{Record, RecordSet, RecordSetError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const UNIT_DIR_PREFIX: &str = "unit_";
pub const UNIT_RECORD_FILE: &str = "unit_record.json";
pub const CONFIG_COPY_FILE: &str = "config.toml";
pub const TEST_COPY_FILE: &str = "test.toml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed unit record {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("run {path} is inconsistent: {source}")]
    RecordSet {
        path: PathBuf,
        #[source]
        source: RecordSetError,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory holding everything recorded for one unit.
pub fn unit_dir(run_dir: &Path, unit_id: u64) -> PathBuf {
    run_dir.join(format!("{UNIT_DIR_PREFIX}{unit_id}"))
}

/// Path of the persisted record of one unit.
pub fn record_path(run_dir: &Path, unit_id: u64) -> PathBuf {
    unit_dir(run_dir, unit_id).join(UNIT_RECORD_FILE)
}

/// Remove any stale output for a unit and recreate its directory.
pub fn prepare_unit_dir(run_dir: &Path, unit_id: u64) -> Result<PathBuf, StoreError> {
    let dir = unit_dir(run_dir, unit_id);
    match fs::remove_dir_all(&dir) {
        Ok(()) => debug!(dir = %dir.display(), "Removed stale unit directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StoreError::io(&dir, e)),
    }
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
    Ok(dir)
}

pub fn write_record(path: &Path, record: &Record) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|e| StoreError::io(path, e))
}

pub fn read_record(path: &Path) -> Result<Record, StoreError> {
    let content = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Re-read every persisted record of a run.
///
/// Only `unit_<n>` directories with a numeric suffix are considered. A unit
/// directory without a record belongs to a unit whose recording aborted and
/// is skipped, so the finished units of that run stay viewable.
pub fn load_run(run_dir: &Path) -> Result<RecordSet, StoreError> {
    let entries = fs::read_dir(run_dir).map_err(|e| StoreError::io(run_dir, e))?;

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(run_dir, e))?;
        let file_type = entry.file_type().map_err(|e| StoreError::io(&entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }

        let name = entry.file_name();
        let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(UNIT_DIR_PREFIX)) else {
            continue;
        };
        if suffix.parse::<u64>().is_err() {
            continue;
        }

        let path = entry.path().join(UNIT_RECORD_FILE);
        if !path.is_file() {
            warn!(path = %path.display(), "Skipping unit without a record");
            continue;
        }
        records.push(read_record(&path)?);
    }

    debug!(run = %run_dir.display(), records = records.len(), "Loaded run");
    RecordSet::new(records).map_err(|source| StoreError::RecordSet {
        path: run_dir.to_path_buf(),
        source,
    })
}

/// Copy an input file into the run directory under a fixed name.
pub fn copy_into_run(source: &Path, run_dir: &Path, name: &str) -> Result<PathBuf, StoreError> {
    let destination = run_dir.join(name);
    fs::copy(source, &destination).map_err(|e| StoreError::io(source, e))?;
    Ok(destination)
}
