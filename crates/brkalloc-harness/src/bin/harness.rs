//! CLI entrypoint for the brkalloc heap harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use brkalloc_harness::{ExerciseConfig, ScenarioKind};

/// Workload driver for the brkalloc heap.
#[derive(Debug, Parser)]
#[command(name = "brkalloc-harness")]
#[command(about = "Scenario and exercise driver for the brkalloc heap")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one of the classic fixed workloads step by step.
    Scenario {
        /// Workload to run: `malloc`, `merge`, or `data`.
        name: String,
        /// Output path for the JSON report (if omitted, prints plain-text
        /// chunk tables to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a seeded random workload with per-step directory validation.
    Exercise {
        /// Seed (decimal or 0x...).
        #[arg(long, default_value = "0xC0FFEE")]
        seed: String,
        /// Number of operations to attempt.
        #[arg(long, default_value_t = 4096)]
        steps: u32,
        /// Width of the live-handle slot array.
        #[arg(long, default_value_t = 32)]
        slots: usize,
        /// Break ceiling in bytes (if omitted, the break is unbounded).
        #[arg(long)]
        ceiling: Option<usize>,
        /// Output path for the JSON report (if omitted, prints a plain-text
        /// summary to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scenario { name, output } => {
            let kind = ScenarioKind::from_str_loose(&name).ok_or_else(|| {
                format!("Unsupported scenario '{name}', expected malloc|merge|data")
            })?;
            eprintln!("Running the `{}` scenario", kind.as_str());
            let report = brkalloc_harness::run_scenario(kind)?;

            if let Some(path) = output {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                eprintln!("Wrote scenario report to {}", path.display());
            } else {
                let body = brkalloc_harness::render::render_scenario_plain(&report);
                print!("{body}");
            }
        }
        Command::Exercise {
            seed,
            steps,
            slots,
            ceiling,
            output,
        } => {
            let seed = parse_seed(&seed)?;
            eprintln!("Running a seeded exercise: seed={seed:#x} steps={steps} slots={slots}");
            let report = brkalloc_harness::run_exercise(ExerciseConfig {
                seed,
                steps,
                slots,
                ceiling,
            })?;
            eprintln!(
                "Exercise complete: allocates={} releases={} denied={}",
                report.ops.allocates, report.ops.releases, report.ops.denied
            );

            if let Some(path) = output {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                eprintln!("Wrote exercise report to {}", path.display());
            } else {
                let body = brkalloc_harness::render::render_exercise_plain(&report);
                print!("{body}");
            }
        }
    }

    Ok(())
}

fn parse_seed(raw: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let s = raw.trim();
    let seed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let hex = hex.replace('_', "");
        u64::from_str_radix(&hex, 16)?
    } else {
        let dec = s.replace('_', "");
        dec.parse::<u64>()?
    };
    Ok(seed)
}
