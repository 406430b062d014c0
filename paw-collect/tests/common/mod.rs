//! Shared fixtures for paw-collect integration tests.

#![allow(dead_code)]

use paw_collect::collector::{Collector, CollectorFailure, overlap};
use paw_collect::{ExecutionError, Executor};
use paw_common::{ArtifactFile, ArtifactKind, CollectorResult, DualDuration};
use std::path::Path;
use std::sync::Once;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().with_target(true).json())
            .with(filter)
            .try_init();
    });
}

/// Runtime hosting profiling sessions while the test thread drives the executor.
pub fn session_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

/// Executor whose behaviour is scripted per call number (1-based).
pub struct ScriptedExecutor {
    pub calls: u64,
    pub latency: Duration,
    /// Fired once the given call has started.
    pub notify_at: Option<(u64, oneshot::Sender<()>)>,
    /// Sleep after firing the notification, so the session can finish inside the call.
    pub linger: Duration,
    pub fail_at: Option<u64>,
}

impl ScriptedExecutor {
    pub fn new(latency: Duration) -> Self {
        Self {
            calls: 0,
            latency,
            notify_at: None,
            linger: Duration::ZERO,
            fail_at: None,
        }
    }

    pub fn notify_at(mut self, call: u64, tx: oneshot::Sender<()>, linger: Duration) -> Self {
        self.notify_at = Some((call, tx));
        self.linger = linger;
        self
    }

    pub fn fail_at(mut self, call: u64) -> Self {
        self.fail_at = Some(call);
        self
    }
}

impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run(&mut self, _unit: &str) -> Result<DualDuration, ExecutionError> {
        self.calls += 1;
        if self.fail_at == Some(self.calls) {
            return Err(ExecutionError::CommandFailed {
                command: "scripted".into(),
                status: "exit status: 1".into(),
                stderr: format!("failed on call {}", self.calls),
            });
        }

        std::thread::sleep(self.latency);
        if self.notify_at.as_ref().is_some_and(|(call, _)| *call == self.calls) {
            if let Some((_, tx)) = self.notify_at.take() {
                let _ = tx.send(());
            }
            std::thread::sleep(self.linger);
        }

        Ok(DualDuration::new(
            Duration::from_millis(self.calls),
            Duration::from_micros(self.calls),
        ))
    }
}

/// Collector whose session is a plain timer and whose artifact is a text file.
pub struct TimerCollector {
    pub runtime: Handle,
    pub window: Duration,
    pub fail: bool,
}

pub const TIMER_ARTIFACT: &str = "timer.folded";

impl Collector for TimerCollector {
    fn name(&self) -> &str {
        "timer"
    }

    fn collect(
        &self,
        executor: &mut dyn Executor,
        unit: &str,
        output_dir: &Path,
    ) -> Result<CollectorResult, CollectorFailure> {
        let result = CollectorResult::new(
            "timer",
            vec![ArtifactFile::new(ArtifactKind::FoldedStacks, TIMER_ARTIFACT)],
        );
        let window = self.window;
        let fail = self.fail;
        let (result, ()) = overlap(
            &self.runtime,
            async move {
                tokio::time::sleep(window).await;
                if fail {
                    return Err(paw_collect::CollectorError::SessionLost);
                }
                Ok(())
            },
            executor,
            unit,
            result,
        )?;
        std::fs::write(output_dir.join(TIMER_ARTIFACT), "timer;sleep 1\n").unwrap();
        Ok(result)
    }
}
