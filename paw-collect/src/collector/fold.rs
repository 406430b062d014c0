//! Stack folding for `perf script` output.
//!
//! Each sample is a header line followed by indented frames, leaf first,
//! and ends at a blank line:
//!
//! ```text
//! clickhouse-serv 4121/4130 [003] 81231.123456:   10101010 cycles:
//! 	    55d0c3a1 DB::Aggregator::executeImpl+0x2a1 (/usr/bin/clickhouse)
//! 	    55d0c000 main+0x10 (/usr/bin/clickhouse)
//! ```
//!
//! Folded output has one `comm;root;...;leaf count` line per distinct stack,
//! sorted, which is the input format of `flamegraph.pl`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

const UNKNOWN_FRAME: &str = "[unknown]";

/// Distinct stacks and how often each was sampled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldedStacks {
    counts: BTreeMap<String, u64>,
}

impl FoldedStacks {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total_samples(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn count(&self, stack: &str) -> Option<u64> {
        self.counts.get(stack).copied()
    }

    /// Render as `stack count` lines.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (stack, count) in &self.counts {
            let _ = writeln!(out, "{stack} {count}");
        }
        out
    }

    fn add(&mut self, stack: String) {
        *self.counts.entry(stack).or_insert(0) += 1;
    }
}

pub fn fold_perf_script(script: &str) -> FoldedStacks {
    let mut folded = FoldedStacks::default();
    let mut comm: Option<String> = None;
    let mut frames: Vec<String> = Vec::new();

    for line in script.lines() {
        if line.starts_with('#') {
            continue;
        }
        if line.trim().is_empty() {
            if let Some(name) = comm.take() {
                folded.add(join_stack(&name, &frames));
            }
            frames.clear();
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if comm.is_some() {
                frames.push(parse_frame(line.trim()));
            }
            continue;
        }

        // A header without a preceding blank line still closes the previous sample.
        if let Some(name) = comm.take() {
            folded.add(join_stack(&name, &frames));
        }
        frames.clear();
        comm = Some(parse_comm(line));
    }

    if let Some(name) = comm {
        folded.add(join_stack(&name, &frames));
    }
    folded
}

fn join_stack(comm: &str, frames: &[String]) -> String {
    let mut stack = comm.to_string();
    for frame in frames.iter().rev() {
        stack.push(';');
        stack.push_str(frame);
    }
    stack
}

/// The command name runs up to the pid (`1234` or `1234/1240`) field.
fn parse_comm(header: &str) -> String {
    let tokens: Vec<&str> = header.split_whitespace().collect();
    let end = tokens
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, token)| is_pid(token))
        .map_or(1, |(idx, _)| idx);
    tokens[..end.min(tokens.len())].join("_")
}

fn is_pid(token: &str) -> bool {
    let mut parts = token.splitn(2, '/');
    parts.all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

/// `addr symbol+0xoff (dso)` to `symbol`, or a bracketed placeholder.
fn parse_frame(line: &str) -> String {
    let rest = line
        .split_once(char::is_whitespace)
        .map_or("", |(_, rest)| rest.trim());

    let (symbol, dso) = match rest.rfind(" (") {
        Some(idx) if rest.ends_with(')') => {
            (rest[..idx].trim(), Some(&rest[idx + 2..rest.len() - 1]))
        }
        _ if rest.starts_with('(') && rest.ends_with(')') => {
            ("", Some(&rest[1..rest.len() - 1]))
        }
        _ => (rest, None),
    };

    let symbol = match symbol.rfind("+0x") {
        Some(idx) => &symbol[..idx],
        None => symbol,
    };

    if !symbol.is_empty() && symbol != UNKNOWN_FRAME {
        return symbol.replace(';', ":");
    }

    match dso {
        Some(dso) if !dso.is_empty() && dso != UNKNOWN_FRAME => {
            let base = dso.rsplit('/').next().unwrap_or(dso);
            format!("[{base}]")
        }
        _ => UNKNOWN_FRAME.to_string(),
    }
}
