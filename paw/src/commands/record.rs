//! `paw record`: measure a test definition into a run directory.

use anyhow::{Context, Result, bail};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use paw_collect::{CollectorRegistry, ExecutorRegistry, MeasurementRun, RunProgress};
use paw_common::store::{self, CONFIG_COPY_FILE, TEST_COPY_FILE};
use paw_common::{PawConfig, Record, TestDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DESCRIPTION_WIDTH: usize = 80;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Test definition file
    pub test: PathBuf,

    /// Configuration file with executor and collector profiles
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Executor profile used for recording
    #[arg(short, long, default_value = "clickhouse")]
    pub profile: String,

    /// Record only the unit with this id
    #[arg(short, long)]
    pub unit: Option<u64>,

    /// Output directory (defaults to the test name)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replace an existing output directory without asking
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: RecordArgs, verbose: bool) -> Result<()> {
    let config = match &args.config {
        Some(path) => PawConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PawConfig::default(),
    };
    let test = TestDefinition::load(&args.test)
        .with_context(|| format!("failed to load test file {}", args.test.display()))?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&test.name));

    info!(
        test = %args.test.display(),
        config = ?args.config,
        profile = %args.profile,
        measure_runs = config.settings.unit_measure_runs,
        units = test.units.len(),
        "Recording"
    );

    // Name resolution happens before anything is written.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start profiling runtime")?;
    let executors = ExecutorRegistry::builtin();
    let profile = executors.resolve_profile(&config, &args.profile)?;
    let executor = executors.create(&profile)?;
    let collectors =
        CollectorRegistry::builtin().build(&config, &test.collectors, runtime.handle())?;

    prepare_output_dir(&output, args.force)?;
    if let Some(config_path) = &args.config {
        store::copy_into_run(config_path, &output, CONFIG_COPY_FILE)?;
    }
    store::copy_into_run(&args.test, &output, TEST_COPY_FILE)?;

    let planned = if args.unit.is_some() { 1 } else { test.units.len() };
    let mut progress = BarProgress::new(planned as u64, verbose);

    let mut run = MeasurementRun::new(executor, &output)
        .with_repeat(config.settings.unit_measure_runs)
        .with_collectors(collectors);
    let records = run.record_all(&test.units, args.unit, &mut progress)?;
    progress.finish();

    info!(
        records = records.len(),
        output = %output.display(),
        "Recording completed"
    );
    Ok(())
}

/// Ensure `output` exists and is empty, asking before deleting an old run.
fn prepare_output_dir(output: &Path, force: bool) -> Result<()> {
    if output.exists() {
        if !force {
            let answer: String = dialoguer::Input::new()
                .with_prompt(format!(
                    "Output folder {} already exists. Type 'delete' to remove",
                    output.display()
                ))
                .allow_empty(true)
                .interact_text()
                .context("failed to read confirmation")?;
            if answer.trim() != "delete" {
                bail!("operation cancelled");
            }
        }
        std::fs::remove_dir_all(output)
            .with_context(|| format!("failed to remove {}", output.display()))?;
        debug!(output = %output.display(), "Removed previous run");
    }
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))
}

struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(len: u64, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(len)
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl RunProgress for BarProgress {
    fn unit_started(&mut self, unit_id: u64, unit: &str) {
        self.bar
            .set_message(describe_unit(unit_id, unit, DESCRIPTION_WIDTH));
    }

    fn unit_finished(&mut self, _record: &Record) {
        self.bar.inc(1);
    }
}

/// One-line description of a unit, cut to `width` characters.
fn describe_unit(unit_id: u64, unit: &str, width: usize) -> String {
    let flat = unit.split_whitespace().collect::<Vec<_>>().join(" ");
    let description = format!("unit {unit_id}: {flat}");
    if description.chars().count() <= width {
        return description;
    }
    let cut: String = description.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_unit_flattens_and_truncates() {
        assert_eq!(describe_unit(3, "SELECT\n  1", 80), "unit 3: SELECT 1");

        let long = "SELECT ".repeat(40);
        let description = describe_unit(12, &long, 40);
        assert_eq!(description.chars().count(), 40);
        assert!(description.starts_with("unit 12: SELECT"));
        assert!(description.ends_with("..."));
    }

    #[test]
    fn test_prepare_output_dir_force_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("run");
        std::fs::create_dir_all(output.join("unit_0")).unwrap();

        prepare_output_dir(&output, true).unwrap();
        assert!(output.is_dir());
        assert!(!output.join("unit_0").exists());
    }

    #[test]
    fn test_prepare_output_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("run");
        prepare_output_dir(&output, false).unwrap();
        assert!(output.is_dir());
    }
}
