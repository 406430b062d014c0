//! On-CPU flamegraph from system-wide `perf` sampling.

use super::fold::fold_perf_script;
use super::scratch::ScratchDir;
use super::session::{ExternalCommand, overlap};
use super::{Collector, CollectorError, CollectorFailure, finish, render_flamegraph, write_artifact};
use crate::executor::Executor;
use paw_common::config::{Settings, SettingsError, setting_str, setting_u64};
use paw_common::{ArtifactFile, ArtifactKind, CollectorResult};
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;
use tracing::{debug, info};

pub const NAME: &str = "cpu_flamegraph";
pub const SVG_FILE: &str = "cpu_flamegraph.svg";
pub const FOLDED_FILE: &str = "cpu_flamegraph.folded";

const PERF_DATA_FILE: &str = "paw.perf.data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuFlamegraphSettings {
    /// Length of the `perf record` session.
    pub build_seconds: u64,
    /// Sampling frequency in Hz.
    pub frequency: u64,
    pub perf: String,
    pub flamegraph: String,
}

impl Default for CpuFlamegraphSettings {
    fn default() -> Self {
        Self {
            build_seconds: 5,
            frequency: 99,
            perf: "perf".to_string(),
            flamegraph: "flamegraph.pl".to_string(),
        }
    }
}

impl CpuFlamegraphSettings {
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let frequency = setting_u64(settings, "frequency", defaults.frequency)?;
        if frequency == 0 {
            return Err(SettingsError::OutOfRange {
                key: "frequency".to_string(),
                value: 0,
            });
        }
        Ok(Self {
            build_seconds: setting_u64(settings, "build_seconds", defaults.build_seconds)?,
            frequency,
            perf: setting_str(settings, "perf", &defaults.perf)?,
            flamegraph: setting_str(settings, "flamegraph", &defaults.flamegraph)?,
        })
    }
}

pub struct CpuFlamegraphCollector {
    settings: CpuFlamegraphSettings,
    runtime: Handle,
    scratch: ScratchDir,
}

impl CpuFlamegraphCollector {
    pub fn new(settings: CpuFlamegraphSettings, runtime: Handle) -> std::io::Result<Self> {
        let scratch = ScratchDir::new(NAME)?;
        debug!(
            collector = NAME,
            build_seconds = settings.build_seconds,
            frequency = settings.frequency,
            "Created collector"
        );
        Ok(Self {
            settings,
            runtime,
            scratch,
        })
    }

    pub fn settings(&self) -> &CpuFlamegraphSettings {
        &self.settings
    }

    fn perf_data(&self) -> PathBuf {
        self.scratch.path().join(PERF_DATA_FILE)
    }

    fn record_command(&self) -> ExternalCommand {
        ExternalCommand::new(&self.settings.perf)
            .arg("record")
            .arg("-F")
            .arg(self.settings.frequency.to_string())
            .arg("-a")
            .arg("-g")
            .arg("-o")
            .arg(self.perf_data().display().to_string())
            .arg("--")
            .arg("sleep")
            .arg(self.settings.build_seconds.to_string())
    }

    fn script_command(&self) -> ExternalCommand {
        ExternalCommand::new(&self.settings.perf)
            .arg("script")
            .arg("-i")
            .arg(self.perf_data().display().to_string())
    }

    fn post_process(&self, output_dir: &Path) -> Result<(), CollectorError> {
        let script = self.script_command().run_blocking()?;
        let folded = fold_perf_script(&String::from_utf8_lossy(&script));
        debug!(
            collector = NAME,
            stacks = folded.len(),
            samples = folded.total_samples(),
            "Folded perf samples"
        );

        let folded_path = output_dir.join(FOLDED_FILE);
        write_artifact(&folded_path, folded.to_text().as_bytes())?;
        render_flamegraph(
            &self.settings.flamegraph,
            &[],
            &folded_path,
            &output_dir.join(SVG_FILE),
        )
    }
}

impl Collector for CpuFlamegraphCollector {
    fn name(&self) -> &str {
        NAME
    }

    fn collect(
        &self,
        executor: &mut dyn Executor,
        unit: &str,
        output_dir: &Path,
    ) -> Result<CollectorResult, CollectorFailure> {
        let result = CollectorResult::new(
            NAME,
            vec![
                ArtifactFile::new(ArtifactKind::Flamegraph, SVG_FILE),
                ArtifactFile::new(ArtifactKind::FoldedStacks, FOLDED_FILE),
            ],
        );

        let record = self.record_command();
        let (result, ()) = overlap(
            &self.runtime,
            async move {
                record.launch().await?;
                Ok::<(), CollectorError>(())
            },
            executor,
            unit,
            result,
        )?;

        info!(
            collector = NAME,
            samples = result.samples.len(),
            output = %output_dir.display(),
            "Rendering flamegraph"
        );
        let outcome = self.post_process(output_dir);
        finish(result, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_settings() {
        let settings = CpuFlamegraphSettings::from_settings(&Settings::new()).unwrap();
        assert_eq!(settings, CpuFlamegraphSettings::default());
        assert_eq!(settings.build_seconds, 5);
        assert_eq!(settings.frequency, 99);
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let settings: Settings = toml::from_str("frequency = 0").unwrap();
        assert!(matches!(
            CpuFlamegraphSettings::from_settings(&settings),
            Err(SettingsError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_record_command_line() {
        let rt = runtime();
        let settings: Settings =
            toml::from_str("build_seconds = 2\nperf = \"/usr/bin/perf\"").unwrap();
        let collector = CpuFlamegraphCollector::new(
            CpuFlamegraphSettings::from_settings(&settings).unwrap(),
            rt.handle().clone(),
        )
        .unwrap();

        let line = collector.record_command().command_line();
        assert!(line.starts_with("/usr/bin/perf record -F 99 -a -g -o "));
        assert!(line.ends_with("paw.perf.data -- sleep 2"));
        assert!(collector.perf_data().starts_with(collector.scratch.path()));
    }
}
