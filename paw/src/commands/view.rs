//! `paw view`: statistics of one run, or the difference between two.

use crate::report::{self, DiffReport, RunReport};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use paw_common::config::resolve_run_dir;
use paw_common::{DiffSummary, RecordSet, analyze, diff_runs, load_run};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Run directory, or the test definition that produced it
    pub lhs: PathBuf,

    /// Second run to compare against the first
    pub rhs: Option<PathBuf>,

    /// Output format for stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write Markdown report fragments into this directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: ViewArgs) -> Result<()> {
    let (lhs_dir, lhs) = load(&args.lhs)?;

    let Some(rhs_path) = &args.rhs else {
        let units = analyze(&lhs);
        let report = RunReport::new(&lhs_dir, &units);
        match args.format {
            OutputFormat::Text => print!("{}", report::render_stats_table(&units)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        if let Some(output) = &args.output {
            let written = report::write_run_markdown(output, &report)?;
            info!(files = written, output = %output.display(), "Wrote report");
        }
        return Ok(());
    };

    let (rhs_dir, rhs) = load(rhs_path)?;
    let diffs = diff_runs(&lhs, &rhs);
    let summary = DiffSummary::from_diffs(&diffs);
    info!(
        lhs = %lhs_dir.display(),
        rhs = %rhs_dir.display(),
        paired = diffs.len(),
        lhs_units = lhs.len(),
        rhs_units = rhs.len(),
        "Compared runs"
    );

    let report = DiffReport::new(&lhs_dir, &rhs_dir, summary, &diffs);
    match args.format {
        OutputFormat::Text => print!("{}", report::render_diff_table(&diffs, &summary)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    if let Some(output) = &args.output {
        let written = report::write_diff_markdown(output, &report)?;
        info!(files = written, output = %output.display(), "Wrote report");
    }
    Ok(())
}

fn load(reference: &Path) -> Result<(PathBuf, RecordSet)> {
    let dir = resolve_run_dir(reference)
        .with_context(|| format!("failed to resolve run {}", reference.display()))?;
    let records =
        load_run(&dir).with_context(|| format!("failed to load run {}", dir.display()))?;
    Ok((dir, records))
}
