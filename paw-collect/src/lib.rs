//! Measurement side of the workbench.
//!
//! - [`executor`]: backends that run one unit of work and time it
//! - [`collector`]: profiling sessions overlapped with live executor traffic
//! - [`registry`]: name to factory tables and profile resolution
//! - [`run`]: the per-unit measurement loop and record persistence

pub mod collector;
pub mod executor;
pub mod registry;
pub mod run;

pub use collector::{Collector, CollectorError, CollectorFailure};
pub use executor::{ExecutionError, Executor};
pub use registry::{CollectorRegistry, ExecutorRegistry, RegistryError};
pub use run::{MeasurementRun, NamedCollector, NoProgress, RunError, RunProgress};
