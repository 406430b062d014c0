//! Name to factory tables for executors and collectors.
//!
//! Both tables are populated explicitly by `builtin()` at startup. Profiles
//! from the configuration take precedence; every registered name also acts
//! as a profile of its own with empty settings.

use crate::collector::Collector;
use crate::collector::cpu_flamegraph::{self, CpuFlamegraphCollector, CpuFlamegraphSettings};
use crate::collector::off_cpu_flamegraph::{
    self, OffCpuFlamegraphCollector, OffCpuFlamegraphSettings,
};
use crate::executor::{ClickHouseExecutor, CommandExecutor, Executor, clickhouse, command};
use crate::run::NamedCollector;
use paw_common::{CollectorProfile, ExecutorProfile, PawConfig, Settings, SettingsError};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;

pub type ExecutorFactory = fn(&Settings) -> Result<Box<dyn Executor>, RegistryError>;
pub type CollectorFactory = fn(&Settings, &Handle) -> Result<Box<dyn Collector>, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("executor profile '{0}' not found")]
    UnknownExecutorProfile(String),

    #[error("collector profile '{0}' not found")]
    UnknownCollectorProfile(String),

    #[error("profile '{profile}' names unknown executor '{executor}'")]
    UnknownExecutor { profile: String, executor: String },

    #[error("profile '{profile}' names unknown collector '{collector}'")]
    UnknownCollector { profile: String, collector: String },

    #[error("'{0}' is already registered")]
    Duplicate(&'static str),

    #[error("{name}: {source}")]
    Settings {
        name: &'static str,
        #[source]
        source: SettingsError,
    },

    #[error("{name}: failed to create scratch directory: {source}")]
    Scratch {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Default)]
pub struct ExecutorRegistry {
    factories: BTreeMap<&'static str, ExecutorFactory>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(clickhouse::NAME, |settings| {
            let executor = ClickHouseExecutor::from_settings(settings).map_err(|source| {
                RegistryError::Settings {
                    name: clickhouse::NAME,
                    source,
                }
            })?;
            Ok(Box::new(executor))
        });
        registry.factories.insert(command::NAME, |settings| {
            let executor =
                CommandExecutor::from_settings(settings).map_err(|source| RegistryError::Settings {
                    name: command::NAME,
                    source,
                })?;
            Ok(Box::new(executor))
        });
        registry
    }

    pub fn register(
        &mut self,
        name: &'static str,
        factory: ExecutorFactory,
    ) -> Result<(), RegistryError> {
        if self.factories.contains_key(name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Find the profile called `name`, falling back to a registered executor of that name.
    pub fn resolve_profile(
        &self,
        config: &PawConfig,
        name: &str,
    ) -> Result<ExecutorProfile, RegistryError> {
        if let Some(profile) = config.profiles.iter().find(|p| p.name == name) {
            return Ok(profile.clone());
        }
        if self.contains(name) {
            return Ok(ExecutorProfile {
                name: name.to_string(),
                executor: name.to_string(),
                settings: Settings::new(),
            });
        }
        Err(RegistryError::UnknownExecutorProfile(name.to_string()))
    }

    pub fn create(&self, profile: &ExecutorProfile) -> Result<Box<dyn Executor>, RegistryError> {
        let factory =
            self.factories
                .get(profile.executor.as_str())
                .ok_or_else(|| RegistryError::UnknownExecutor {
                    profile: profile.name.clone(),
                    executor: profile.executor.clone(),
                })?;
        debug!(profile = %profile.name, executor = %profile.executor, "Creating executor");
        factory(&profile.settings)
    }
}

#[derive(Default)]
pub struct CollectorRegistry {
    factories: BTreeMap<&'static str, CollectorFactory>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert(cpu_flamegraph::NAME, |settings, runtime| {
                let name = cpu_flamegraph::NAME;
                let settings = CpuFlamegraphSettings::from_settings(settings)
                    .map_err(|source| RegistryError::Settings { name, source })?;
                let collector = CpuFlamegraphCollector::new(settings, runtime.clone())
                    .map_err(|source| RegistryError::Scratch { name, source })?;
                Ok(Box::new(collector))
            });
        registry
            .factories
            .insert(off_cpu_flamegraph::NAME, |settings, runtime| {
                let name = off_cpu_flamegraph::NAME;
                let settings = OffCpuFlamegraphSettings::from_settings(settings)
                    .map_err(|source| RegistryError::Settings { name, source })?;
                let collector = OffCpuFlamegraphCollector::new(settings, runtime.clone())
                    .map_err(|source| RegistryError::Scratch { name, source })?;
                Ok(Box::new(collector))
            });
        registry
    }

    pub fn register(
        &mut self,
        name: &'static str,
        factory: CollectorFactory,
    ) -> Result<(), RegistryError> {
        if self.factories.contains_key(name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Resolve every name in order. The first unknown name fails the whole list.
    pub fn resolve_profiles(
        &self,
        config: &PawConfig,
        names: &[String],
    ) -> Result<Vec<CollectorProfile>, RegistryError> {
        names
            .iter()
            .map(|name| {
                if let Some(profile) = config.collector_profiles.iter().find(|p| &p.name == name) {
                    return Ok(profile.clone());
                }
                if self.contains(name) {
                    return Ok(CollectorProfile {
                        name: name.clone(),
                        collector: name.clone(),
                        settings: Settings::new(),
                    });
                }
                Err(RegistryError::UnknownCollectorProfile(name.clone()))
            })
            .collect()
    }

    pub fn create(
        &self,
        profile: &CollectorProfile,
        runtime: &Handle,
    ) -> Result<Box<dyn Collector>, RegistryError> {
        let factory = self
            .factories
            .get(profile.collector.as_str())
            .ok_or_else(|| RegistryError::UnknownCollector {
                profile: profile.name.clone(),
                collector: profile.collector.clone(),
            })?;
        debug!(profile = %profile.name, collector = %profile.collector, "Creating collector");
        factory(&profile.settings, runtime)
    }

    /// Resolve and instantiate the collectors of a test, keyed by profile name.
    pub fn build(
        &self,
        config: &PawConfig,
        names: &[String],
        runtime: &Handle,
    ) -> Result<Vec<NamedCollector>, RegistryError> {
        self.resolve_profiles(config, names)?
            .into_iter()
            .map(|profile| {
                let collector = self.create(&profile, runtime)?;
                Ok(NamedCollector::new(profile.name, collector))
            })
            .collect()
    }
}
