//! Local command executor.
//!
//! Each unit is either a shell snippet (`sh -c <unit>`) or, when `program` is
//! configured, the stdin of that program. The backend reports no timing of
//! its own, so the server duration is always zero.

use super::{ExecutionError, Executor};
use paw_common::DualDuration;
use paw_common::config::{Settings, SettingsError, setting_opt_str, setting_str};
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const NAME: &str = "command";

const DEFAULT_SHELL: &str = "sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExecutor {
    shell: String,
    program: Option<String>,
}

impl CommandExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            program: None,
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self {
            shell: setting_str(settings, "shell", DEFAULT_SHELL)?,
            program: setting_opt_str(settings, "program")?,
        })
    }

    fn command_line(&self, unit: &str) -> String {
        let script = self.program.as_deref().unwrap_or(unit);
        format!("{} -c {script}", self.shell)
    }
}

impl Executor for CommandExecutor {
    fn name(&self) -> &str {
        NAME
    }

    fn run(&mut self, unit: &str) -> Result<DualDuration, ExecutionError> {
        let mut command = Command::new(&self.shell);
        command.stdout(Stdio::null()).stderr(Stdio::piped());
        match &self.program {
            Some(program) => {
                command.arg("-c").arg(program).stdin(Stdio::piped());
            }
            None => {
                command.arg("-c").arg(unit).stdin(Stdio::null());
            }
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ExecutionError::Io {
            action: format!("spawn {}", self.shell),
            source,
        })?;

        // stdin is fed from its own thread so a program that writes stderr
        // before reading its input cannot deadlock against us.
        let stdin = child.stdin.take();
        let (output, written) = thread::scope(|scope| {
            let writer =
                stdin.map(|mut stdin| scope.spawn(move || stdin.write_all(unit.as_bytes())));
            let output = child.wait_with_output();
            let written = match writer {
                Some(writer) => writer
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
                None => Ok(()),
            };
            (output, written)
        });

        let output = output.map_err(|source| ExecutionError::Io {
            action: format!("wait for {}", self.shell),
            source,
        })?;
        match written {
            Ok(()) => {}
            // The program may exit without reading its input.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(source) => {
                return Err(ExecutionError::Io {
                    action: "write unit to stdin".into(),
                    source,
                });
            }
        }
        let client_duration = started.elapsed();

        if !output.status.success() {
            return Err(ExecutionError::CommandFailed {
                command: self.command_line(unit),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(DualDuration::new(client_duration, Duration::ZERO))
    }
}
