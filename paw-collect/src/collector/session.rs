//! Overlapping a background profiling session with live executor traffic.
//!
//! The session future runs on the tokio runtime and reports its outcome
//! through a oneshot channel. The calling thread keeps invoking the executor
//! and checks the channel with `try_recv` after every call, so the burst stops
//! at most one executor call after the session finishes.

use super::{CollectorError, CollectorFailure};
use crate::executor::Executor;
use paw_common::CollectorResult;
use std::future::Future;
use std::process::{ExitStatus, Output, Stdio};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// An external tool invocation: the profiler itself or a post-processing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run as a profiling session. The child is killed if the future is dropped.
    pub async fn launch(self) -> Result<Vec<u8>, SessionError> {
        debug!(command = %self.command_line(), "Launching profiling session");
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SessionError::Launch {
                command: self.command_line(),
                source,
            })?;
        self.check(output)
    }

    /// Run to completion on the calling thread.
    pub fn run_blocking(&self) -> Result<Vec<u8>, SessionError> {
        debug!(command = %self.command_line(), "Running");
        let output = std::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SessionError::Launch {
                command: self.command_line(),
                source,
            })?;
        self.check(output)
    }

    fn check(&self, output: Output) -> Result<Vec<u8>, SessionError> {
        if output.status.success() {
            return Ok(output.stdout);
        }
        Err(SessionError::Failed {
            command: self.command_line(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Aborts the session task if the burst ends early; a no-op once it finished.
struct SessionTask(JoinHandle<()>);

impl Drop for SessionTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drive `executor` against `unit` for as long as `session` is running.
///
/// Samples are appended to `result`. On success the session's output is
/// returned with the result; on any failure the samples gathered so far are
/// returned inside the [`CollectorFailure`].
pub fn overlap<T, F>(
    runtime: &Handle,
    session: F,
    executor: &mut dyn Executor,
    unit: &str,
    mut result: CollectorResult,
) -> Result<(CollectorResult, T), CollectorFailure>
where
    T: Send + 'static,
    F: Future<Output = Result<T, CollectorError>> + Send + 'static,
{
    let (done_tx, mut done_rx) = oneshot::channel();
    let _task = SessionTask(runtime.spawn(async move {
        let outcome = session.await;
        let _ = done_tx.send(outcome);
    }));

    loop {
        match executor.run(unit) {
            Ok(sample) => result.samples.push(sample),
            Err(e) => {
                warn!(
                    collector = %result.name,
                    samples = result.samples.len(),
                    error = %e,
                    "Executor failed during profiling session"
                );
                return Err(CollectorFailure::new(result, e.into()));
            }
        }

        match done_rx.try_recv() {
            Ok(Ok(output)) => {
                debug!(
                    collector = %result.name,
                    samples = result.samples.len(),
                    "Profiling session finished"
                );
                return Ok((result, output));
            }
            Ok(Err(e)) => return Err(CollectorFailure::new(result, e)),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Closed) => {
                return Err(CollectorFailure::new(result, CollectorError::SessionLost));
            }
        }
    }
}
