//! Performance workbench CLI.
#![forbid(unsafe_code)]

mod commands;
mod report;

use anyhow::Result;
use clap::{Parser, Subcommand};
use paw_common::{LogConfig, init_logging};
use tracing::error;

#[derive(Parser)]
#[command(
    name = "paw",
    version,
    about = "Record benchmark runs with profiling collectors and compare them"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure every unit of a test definition into a run directory
    Record(commands::record::RecordArgs),

    /// Show the statistics of one run, or compare two runs
    View(commands::view::ViewArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    let result = match cli.command {
        Commands::Record(args) => commands::record::run(args, cli.verbose),
        Commands::View(args) => commands::view::run(args),
    };
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Command failed");
    }
    result
}
