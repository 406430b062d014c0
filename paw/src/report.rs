//! Terminal tables, JSON documents and Markdown fragments for `paw view`.
//!
//! Markdown fragments are rendered in parallel, one per unit, and collected
//! into a map keyed by unit id; the map lock is held only for the insert.

use anyhow::{Context, Result};
use console::style;
use paw_common::store::unit_dir;
use paw_common::{DiffSummary, DurationStats, MedianDiff, Significance, StatsRecord, UnitDiff};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const INDEX_FILE: &str = "index.md";

const UNIT_COLUMN_WIDTH: usize = 40;

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub run: PathBuf,
    pub units: &'a [StatsRecord<'a>],
}

impl<'a> RunReport<'a> {
    pub fn new(run: &Path, units: &'a [StatsRecord<'a>]) -> Self {
        Self {
            run: run.to_path_buf(),
            units,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DiffReport<'a> {
    pub lhs: PathBuf,
    pub rhs: PathBuf,
    pub summary: DiffSummary,
    pub units: &'a [UnitDiff],
}

impl<'a> DiffReport<'a> {
    pub fn new(lhs: &Path, rhs: &Path, summary: DiffSummary, units: &'a [UnitDiff]) -> Self {
        Self {
            lhs: lhs.to_path_buf(),
            rhs: rhs.to_path_buf(),
            summary,
            units,
        }
    }
}

pub fn render_stats_table(units: &[StatsRecord<'_>]) -> String {
    if units.is_empty() {
        return "no units recorded\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {:<width$}  {:>10} {:>10} {:>10} {:>10} {:>10}  {:>10}",
        "unit",
        "query",
        "min ms",
        "median ms",
        "mean ms",
        "max ms",
        "stddev ms",
        "server ms",
        width = UNIT_COLUMN_WIDTH
    );
    for unit in units {
        let client = &unit.stats.client;
        let _ = writeln!(
            out,
            "{:>5}  {:<width$}  {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}  {:>10.2}",
            unit.record.unit_id,
            shorten(&unit.record.unit, UNIT_COLUMN_WIDTH),
            client.min_ms(),
            client.median_ms(),
            client.mean_ms(),
            client.max_ms(),
            client.std_dev_ms(),
            unit.stats.server.median_ms(),
            width = UNIT_COLUMN_WIDTH
        );
    }
    out
}

pub fn render_diff_table(diffs: &[UnitDiff], summary: &DiffSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {:<width$}  {:>10} {:>10} {:>9}  {:>10} {:>10} {:>9}",
        "unit",
        "query",
        "lhs ms",
        "rhs ms",
        "client",
        "lhs srv",
        "rhs srv",
        "server",
        width = UNIT_COLUMN_WIDTH
    );
    for diff in diffs {
        let _ = writeln!(
            out,
            "{:>5}  {:<width$}  {:>10.2} {:>10.2} {}  {:>10.2} {:>10.2} {}",
            diff.unit_id,
            shorten(&diff.unit, UNIT_COLUMN_WIDTH),
            diff.client.lhs_ms,
            diff.client.rhs_ms,
            paint(diff.client.significance, format!("{:>9}", percent(&diff.client))),
            diff.server.lhs_ms,
            diff.server.rhs_ms,
            paint(diff.server.significance, format!("{:>9}", percent(&diff.server))),
            width = UNIT_COLUMN_WIDTH
        );
    }
    let _ = writeln!(
        out,
        "\n{} units compared: client {} regressions, {} improvements; server {} regressions, {} improvements",
        summary.units,
        summary.client_regressions,
        summary.client_improvements,
        summary.server_regressions,
        summary.server_improvements,
    );
    out
}

/// Render one fragment per item in parallel, keyed by unit id.
pub fn render_fragments<T, F>(items: &[T], render: F) -> BTreeMap<u64, String>
where
    T: Sync,
    F: Fn(&T) -> (u64, String) + Sync,
{
    let fragments = Mutex::new(BTreeMap::new());
    items.par_iter().for_each(|item| {
        let (unit_id, text) = render(item);
        fragments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(unit_id, text);
    });
    fragments.into_inner().unwrap_or_else(|e| e.into_inner())
}

/// Write `unit_<id>.md` per unit plus an index. Returns the number of files written.
pub fn write_run_markdown(output: &Path, report: &RunReport<'_>) -> Result<usize> {
    let run = std::path::absolute(&report.run).unwrap_or_else(|_| report.run.clone());
    let fragments = render_fragments(report.units, |unit| {
        (unit.record.unit_id, unit_markdown(&run, unit))
    });

    let mut index = format!("# Run `{}`\n\n", report.run.display());
    index.push_str("| unit | client median ms | server median ms |\n|---|---|---|\n");
    for unit in report.units {
        let _ = writeln!(
            index,
            "| [unit {id}](unit_{id}.md) | {:.2} | {:.2} |",
            unit.stats.client.median_ms(),
            unit.stats.server.median_ms(),
            id = unit.record.unit_id,
        );
    }

    write_fragments(output, &fragments, &index)
}

pub fn write_diff_markdown(output: &Path, report: &DiffReport<'_>) -> Result<usize> {
    let fragments = render_fragments(report.units, |diff| (diff.unit_id, diff_markdown(diff)));

    let summary = &report.summary;
    let mut index = format!(
        "# `{}` vs `{}`\n\n{} units compared. Client: {} regressions, {} improvements. \
         Server: {} regressions, {} improvements.\n\n",
        report.lhs.display(),
        report.rhs.display(),
        summary.units,
        summary.client_regressions,
        summary.client_improvements,
        summary.server_regressions,
        summary.server_improvements,
    );
    index.push_str("| unit | client | server |\n|---|---|---|\n");
    for diff in report.units {
        let _ = writeln!(
            index,
            "| [unit {id}](unit_{id}.md) | {} {} | {} {} |",
            percent(&diff.client),
            diff.client.significance,
            percent(&diff.server),
            diff.server.significance,
            id = diff.unit_id,
        );
    }

    write_fragments(output, &fragments, &index)
}

fn write_fragments(output: &Path, fragments: &BTreeMap<u64, String>, index: &str) -> Result<usize> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    for (unit_id, text) in fragments {
        let path = output.join(format!("unit_{unit_id}.md"));
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    let index_path = output.join(INDEX_FILE);
    std::fs::write(&index_path, index)
        .with_context(|| format!("failed to write {}", index_path.display()))?;
    Ok(fragments.len() + 1)
}

fn unit_markdown(run: &Path, unit: &StatsRecord<'_>) -> String {
    let record = unit.record;
    let mut out = format!("## Unit {}\n\n```sql\n{}\n```\n\n", record.unit_id, record.unit.trim());
    let _ = writeln!(out, "{} runs\n", record.execution_times.len());
    out.push_str("| | min ms | median ms | mean ms | max ms | stddev ms |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    stats_row(&mut out, "client", &unit.stats.client);
    stats_row(&mut out, "server", &unit.stats.server);

    if !record.collector_results.is_empty() {
        out.push_str("\n### Collectors\n\n");
        let dir = unit_dir(run, record.unit_id);
        for result in &record.collector_results {
            let _ = write!(out, "- `{}` ({} runs):", result.name, result.samples.len());
            for file in &result.files {
                let path = dir.join(&result.name).join(&file.name);
                let _ = write!(out, " [{}]({})", file.kind, path.display());
            }
            out.push('\n');
        }
    }
    out
}

fn diff_markdown(diff: &UnitDiff) -> String {
    let mut out = format!("## Unit {}\n\n```sql\n{}\n```\n\n", diff.unit_id, diff.unit.trim());
    out.push_str("| | lhs median ms | rhs median ms | difference | |\n");
    out.push_str("|---|---|---|---|---|\n");
    for (label, median) in [("client", &diff.client), ("server", &diff.server)] {
        let _ = writeln!(
            out,
            "| {label} | {:.2} | {:.2} | {} | {} |",
            median.lhs_ms,
            median.rhs_ms,
            percent(median),
            median.significance
        );
    }
    out
}

fn stats_row(out: &mut String, label: &str, stats: &DurationStats) {
    let _ = writeln!(
        out,
        "| {label} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
        stats.min_ms(),
        stats.median_ms(),
        stats.mean_ms(),
        stats.max_ms(),
        stats.std_dev_ms()
    );
}

fn percent(median: &MedianDiff) -> String {
    format!("{:+.2}%", median.relative_percent)
}

fn paint(significance: Significance, text: String) -> String {
    match significance {
        Significance::Regression => style(text).red().to_string(),
        Significance::Improvement => style(text).green().to_string(),
        Significance::Unchanged => text,
    }
}

/// Collapse whitespace and cut to `width` characters.
fn shorten(unit: &str, width: usize) -> String {
    let flat = unit.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let cut: String = flat.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}
