//! Profiling collectors.
//!
//! A collector runs a fixed-length profiling session while the executor is
//! kept busy with the unit under test, then turns the raw profile into
//! artifact files in the unit's output directory. See [`session::overlap`]
//! for the foreground/background handoff.

pub mod cpu_flamegraph;
pub mod fold;
pub mod off_cpu_flamegraph;
pub mod scratch;
pub mod session;

use crate::executor::{ExecutionError, Executor};
use paw_common::CollectorResult;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use cpu_flamegraph::CpuFlamegraphCollector;
pub use off_cpu_flamegraph::OffCpuFlamegraphCollector;
pub use scratch::ScratchDir;
pub use session::{ExternalCommand, SessionError, overlap};

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("executor failed during profiling: {0}")]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("profiling session ended without reporting a result")]
    SessionLost,

    #[error("failed to write artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A failed collection together with the samples gathered before the failure.
#[derive(Debug, Error)]
#[error("collector {} failed after {} samples: {}", .partial.name, .partial.samples.len(), .source)]
pub struct CollectorFailure {
    pub partial: CollectorResult,
    #[source]
    pub source: CollectorError,
}

impl CollectorFailure {
    pub fn new(partial: CollectorResult, source: CollectorError) -> Self {
        Self { partial, source }
    }
}

pub trait Collector: Send {
    fn name(&self) -> &str;

    /// Profile the backend while it runs `unit`, writing artifacts into `output_dir`.
    fn collect(
        &self,
        executor: &mut dyn Executor,
        unit: &str,
        output_dir: &Path,
    ) -> Result<CollectorResult, CollectorFailure>;
}

/// Attach `result` to the outcome of post-processing.
pub(crate) fn finish(
    result: CollectorResult,
    post_process: Result<(), CollectorError>,
) -> Result<CollectorResult, CollectorFailure> {
    match post_process {
        Ok(()) => Ok(result),
        Err(e) => Err(CollectorFailure::new(result, e)),
    }
}

/// Write an artifact file readable by the group.
pub(crate) fn write_artifact(path: &Path, contents: &[u8]) -> Result<(), CollectorError> {
    let artifact_error = |source| CollectorError::Artifact {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(path, contents).map_err(artifact_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o664))
            .map_err(artifact_error)?;
    }
    Ok(())
}

/// Render folded stacks at `folded` into an SVG flamegraph at `svg`.
pub(crate) fn render_flamegraph(
    flamegraph: &str,
    options: &[&str],
    folded: &Path,
    svg: &Path,
) -> Result<(), CollectorError> {
    let command = options
        .iter()
        .fold(ExternalCommand::new(flamegraph), |command, option| {
            command.arg(*option)
        })
        .arg(folded.display().to_string());
    let rendered = command.run_blocking()?;
    write_artifact(svg, &rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paw_common::DualDuration;
    use std::time::Duration;

    #[test]
    fn test_failure_message_counts_partial_samples() {
        let mut partial = CollectorResult::new("cpu", Vec::new());
        partial.samples.push(DualDuration::new(Duration::from_millis(3), Duration::ZERO));
        let failure = CollectorFailure::new(partial, CollectorError::SessionLost);
        assert_eq!(
            failure.to_string(),
            "collector cpu failed after 1 samples: profiling session ended without reporting a result"
        );
        assert_eq!(failure.partial.samples.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_artifact_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu_flamegraph.svg");
        write_artifact(&path, b"<svg/>").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o664);
    }

    #[cfg(unix)]
    #[test]
    fn test_render_flamegraph_writes_tool_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let folded = dir.path().join("stacks.folded");
        let svg = dir.path().join("stacks.svg");
        std::fs::write(&folded, "a;b 1\n").unwrap();

        // `cat` stands in for the renderer: the svg receives the folded input.
        render_flamegraph("cat", &[], &folded, &svg).unwrap();
        assert_eq!(std::fs::read_to_string(&svg).unwrap(), "a;b 1\n");
    }

    #[test]
    fn test_render_flamegraph_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_flamegraph(
            "/nonexistent/flamegraph.pl",
            &["--title=x"],
            &dir.path().join("in"),
            &dir.path().join("out.svg"),
        )
        .unwrap_err();
        assert!(matches!(err, CollectorError::Session(SessionError::Launch { .. })));
    }
}
