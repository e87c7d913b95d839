//! Plain-text rendering of harness reports.
//!
//! The chunk table keeps the shape of the original driver's heap dump:
//! one numbered line per chunk in link order, then a rule.

use std::fmt::Write;

use brkalloc_core::{ChunkRecord, MetricsSnapshot};

use crate::report::{ExerciseReport, ScenarioReport};

const RULE: &str =
    "===================================================================================";

fn link(address: Option<usize>) -> String {
    match address {
        Some(offset) => format!("{offset:#x}"),
        None => "none".to_string(),
    }
}

/// Renders the directory walk as the classic numbered chunk table.
#[must_use]
pub fn render_chunk_table(chunks: &[ChunkRecord]) -> String {
    let mut out = String::new();
    if chunks.is_empty() {
        out.push_str("(heap empty)\n");
    }
    for (index, chunk) in chunks.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] chunk_address = {:#x}, size = {}, free={}, next={} prev={}",
            index + 1,
            chunk.address,
            chunk.size,
            chunk.free,
            link(chunk.next_address),
            link(chunk.prev_address),
        );
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

fn render_metrics(out: &mut String, metrics: &MetricsSnapshot) {
    let _ = writeln!(
        out,
        "metrics: allocations={} zeroed={} resizes={} releases={}",
        metrics.allocations, metrics.zeroed_allocations, metrics.resizes, metrics.releases,
    );
    let _ = writeln!(
        out,
        "         reuses={} splits={} coalesces={} grows={} shrinks={}",
        metrics.reuses, metrics.splits, metrics.coalesces, metrics.grows, metrics.shrinks,
    );
    let _ = writeln!(
        out,
        "         grow_failures={} double_releases={} unknown_handles={}",
        metrics.grow_failures, metrics.double_releases, metrics.unknown_handles,
    );
}

/// Renders a full scenario run: every step's table, then the counters.
#[must_use]
pub fn render_scenario_plain(report: &ScenarioReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[+] scenario: {}", report.scenario);
    for step in &report.steps {
        let _ = writeln!(out, "[+] {}", step.label);
        for note in &step.notes {
            let _ = writeln!(out, "    {note}");
        }
        out.push_str(&render_chunk_table(&step.chunks));
    }
    render_metrics(&mut out, &report.metrics);
    out
}

/// Renders an exercise summary: configuration, tallies, final table.
#[must_use]
pub fn render_exercise_plain(report: &ExerciseReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[+] exercise: seed={:#x} steps={} slots={}",
        report.seed, report.steps, report.slots,
    );
    if let Some(ceiling) = report.ceiling {
        let _ = writeln!(out, "    ceiling={ceiling} bytes");
    }
    let _ = writeln!(
        out,
        "    ops: allocates={} zeroed={} resizes={} releases={} denied={}",
        report.ops.allocates,
        report.ops.zeroed_allocates,
        report.ops.resizes,
        report.ops.releases,
        report.ops.denied,
    );
    let _ = writeln!(
        out,
        "    validations={} peak_high_water={:#x}",
        report.validations, report.peak_high_water,
    );
    let _ = writeln!(out, "[+] final heap");
    out.push_str(&render_chunk_table(&report.final_chunks));
    render_metrics(&mut out, &report.metrics);
    out
}
