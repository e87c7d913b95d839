//! Scenario and exercise driver for the brkalloc heap.
//!
//! This crate provides:
//! - Scenario runs: the three classic allocator workloads (`malloc`,
//!   `merge`, `data`), capturing the chunk table after every step
//! - Exercise runs: deterministic seeded random workloads with per-step
//!   directory validation and payload content checks
//! - Report rendering: plain-text chunk tables and machine-readable JSON

#![forbid(unsafe_code)]

pub mod exercise;
pub mod render;
pub mod report;
pub mod scenario;

pub use exercise::{ExerciseConfig, run_exercise};
pub use report::{ExerciseReport, HarnessError, OpTally, ScenarioReport, StepReport};
pub use scenario::{ScenarioKind, run_scenario};
