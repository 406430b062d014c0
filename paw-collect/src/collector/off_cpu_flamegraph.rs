//! Off-CPU flamegraph from the BCC `offcputime` tool.
//!
//! `offcputime -df` already prints folded stacks, with blocked time in
//! microseconds as the count.

use super::scratch::ScratchDir;
use super::session::{ExternalCommand, overlap};
use super::{Collector, CollectorError, CollectorFailure, finish, render_flamegraph, write_artifact};
use crate::executor::Executor;
use paw_common::config::{Settings, SettingsError, setting_str, setting_u64};
use paw_common::{ArtifactFile, ArtifactKind, CollectorResult};
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;
use tracing::{debug, info};

pub const NAME: &str = "off_cpu_flamegraph";
pub const SVG_FILE: &str = "off_cpu_flamegraph.svg";
pub const FOLDED_FILE: &str = "off_cpu_flamegraph.folded";

const RAW_STACKS_FILE: &str = "paw.offcpu.stacks";
const RENDER_OPTIONS: [&str; 3] = [
    "--color=io",
    "--title=Off-CPU Time Flame Graph",
    "--countname=us",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffCpuFlamegraphSettings {
    pub build_seconds: u64,
    pub offcputime: String,
    pub flamegraph: String,
}

impl Default for OffCpuFlamegraphSettings {
    fn default() -> Self {
        Self {
            build_seconds: 5,
            offcputime: "offcputime-bpfcc".to_string(),
            flamegraph: "flamegraph.pl".to_string(),
        }
    }
}

impl OffCpuFlamegraphSettings {
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        Ok(Self {
            build_seconds: setting_u64(settings, "build_seconds", defaults.build_seconds)?,
            offcputime: setting_str(settings, "offcputime", &defaults.offcputime)?,
            flamegraph: setting_str(settings, "flamegraph", &defaults.flamegraph)?,
        })
    }
}

pub struct OffCpuFlamegraphCollector {
    settings: OffCpuFlamegraphSettings,
    runtime: Handle,
    scratch: ScratchDir,
}

impl OffCpuFlamegraphCollector {
    pub fn new(settings: OffCpuFlamegraphSettings, runtime: Handle) -> std::io::Result<Self> {
        let scratch = ScratchDir::new(NAME)?;
        debug!(collector = NAME, build_seconds = settings.build_seconds, "Created collector");
        Ok(Self {
            settings,
            runtime,
            scratch,
        })
    }

    fn raw_stacks(&self) -> PathBuf {
        self.scratch.path().join(RAW_STACKS_FILE)
    }

    fn trace_command(&self) -> ExternalCommand {
        ExternalCommand::new(&self.settings.offcputime)
            .arg("-df")
            .arg(self.settings.build_seconds.to_string())
    }

    fn post_process(&self, output_dir: &Path) -> Result<(), CollectorError> {
        let raw_path = self.raw_stacks();
        let raw = std::fs::read_to_string(&raw_path).map_err(|source| CollectorError::Artifact {
            path: raw_path,
            source,
        })?;
        let folded = folded_lines(&raw);

        let folded_path = output_dir.join(FOLDED_FILE);
        write_artifact(&folded_path, folded.as_bytes())?;
        render_flamegraph(
            &self.settings.flamegraph,
            &RENDER_OPTIONS,
            &folded_path,
            &output_dir.join(SVG_FILE),
        )
    }
}

impl Collector for OffCpuFlamegraphCollector {
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

        let trace = self.trace_command();
        let raw_path = self.raw_stacks();
        let (result, ()) = overlap(
            &self.runtime,
            async move {
                let stacks = trace.launch().await?;
                tokio::fs::write(&raw_path, stacks)
                    .await
                    .map_err(|source| CollectorError::Artifact {
                        path: raw_path.clone(),
                        source,
                    })?;
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

/// Keep only `stack count` lines; the tool may interleave notices with its output.
fn folded_lines(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let Some((stack, count)) = line.trim_end().rsplit_once(' ') else {
            continue;
        };
        if stack.is_empty() || count.parse::<u64>().is_err() {
            continue;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
