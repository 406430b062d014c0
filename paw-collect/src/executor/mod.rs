//! Backend executors.
//!
//! An executor owns a persistent session with the target system and runs one
//! unit of work per call, returning both the wall time seen by the caller and
//! the time reported by the backend.

pub mod clickhouse;
pub mod command;

use paw_common::DualDuration;
use thiserror::Error;

pub use clickhouse::ClickHouseExecutor;
pub use command::CommandExecutor;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{executor} request failed: {message}")]
    Transport {
        executor: &'static str,
        message: String,
    },

    #[error("{executor} returned HTTP {status}: {body}")]
    Status {
        executor: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Runs one unit of work against a backend.
///
/// Any error is fatal to the measurement run; implementations must not retry.
pub trait Executor: Send {
    fn name(&self) -> &str;

    fn run(&mut self, unit: &str) -> Result<DualDuration, ExecutionError>;
}
