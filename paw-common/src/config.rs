//! Configuration and test definition files.
//!
//! Both files are TOML. The configuration names executor profiles, collector
//! profiles and run settings; the test definition lists the units to measure
//! and the collector profiles to apply to each of them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Free-form settings handed to an executor or collector factory.
pub type Settings = toml::Table;

/// Default number of timed executor calls per unit.
pub const DEFAULT_UNIT_MEASURE_RUNS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{path}: unit_measure_runs must be at least 1")]
    ZeroMeasureRuns { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("setting '{key}' is not {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("setting '{key}' is out of range: {value}")]
    OutOfRange { key: String, value: i64 },
}

/// Read a string setting, falling back to `default` when absent.
pub fn setting_str(settings: &Settings, key: &str, default: &str) -> Result<String, SettingsError> {
    match settings.get(key) {
        None => Ok(default.to_string()),
        Some(toml::Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(SettingsError::WrongType {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

/// Read an optional string setting.
pub fn setting_opt_str(settings: &Settings, key: &str) -> Result<Option<String>, SettingsError> {
    match settings.get(key) {
        None => Ok(None),
        Some(toml::Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(SettingsError::WrongType {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

/// Read a non-negative integer setting, falling back to `default` when absent.
pub fn setting_u64(settings: &Settings, key: &str, default: u64) -> Result<u64, SettingsError> {
    match settings.get(key) {
        None => Ok(default),
        Some(toml::Value::Integer(value)) => {
            u64::try_from(*value).map_err(|_| SettingsError::OutOfRange {
                key: key.to_string(),
                value: *value,
            })
        }
        Some(_) => Err(SettingsError::WrongType {
            key: key.to_string(),
            expected: "an integer",
        }),
    }
}

/// Executor profile: a named executor with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorProfile {
    pub name: String,
    pub executor: String,
    #[serde(default)]
    pub settings: Settings,
}

/// Collector profile: a named collector with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorProfile {
    pub name: String,
    pub collector: String,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Timed executor calls per unit before collectors run.
    #[serde(default = "default_unit_measure_runs")]
    pub unit_measure_runs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            unit_measure_runs: DEFAULT_UNIT_MEASURE_RUNS,
        }
    }
}

fn default_unit_measure_runs() -> u64 {
    DEFAULT_UNIT_MEASURE_RUNS
}

/// Recorder configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PawConfig {
    #[serde(default)]
    pub profiles: Vec<ExecutorProfile>,
    #[serde(default)]
    pub collector_profiles: Vec<CollectorProfile>,
    #[serde(default)]
    pub settings: RunSettings,
}

impl PawConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: Self = parse_toml_file(path)?;
        if config.settings.unit_measure_runs == 0 {
            return Err(ConfigError::ZeroMeasureRuns {
                path: path.to_path_buf(),
            });
        }
        Ok(config)
    }
}

/// A test definition: the units to measure and the collectors to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub name: String,
    #[serde(default)]
    pub collectors: Vec<String>,
    #[serde(default)]
    pub units: Vec<String>,
}

impl TestDefinition {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        parse_toml_file(path.as_ref())
    }
}

/// Resolve a run reference: a test definition file resolves to the test's
/// name, anything else is taken as a run directory.
pub fn resolve_run_dir(reference: &Path) -> Result<PathBuf, ConfigError> {
    if reference.extension().is_some_and(|ext| ext == "toml") {
        let test = TestDefinition::load(reference)?;
        return Ok(PathBuf::from(test.name));
    }
    Ok(reference.to_path_buf())
}

fn parse_toml_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
