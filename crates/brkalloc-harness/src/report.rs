//! Report types shared by the scenario and exercise runners.
//!
//! Everything here serializes with serde so the CLI can write a JSON
//! report without mirror types; the plain-text rendering lives in
//! [`crate::render`].

use brkalloc_core::{ChunkRecord, HeapError, MetricsSnapshot};
use serde::Serialize;
use thiserror::Error;

/// Failure surfaced by a harness run.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A heap operation the workload expected to succeed failed.
    #[error("heap operation failed: {0}")]
    Heap(#[from] HeapError),
    /// The directory failed its structural check mid-run.
    #[error("directory invariant violated: {0}")]
    Invariant(String),
    /// Payload bytes read back did not match what the workload wrote.
    #[error("payload verification failed: {0}")]
    Verification(String),
}

/// Chunk table captured after one workload step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// What the workload just did.
    pub label: String,
    /// Free-form observation lines (list values, retained prefixes).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Directory walk at this point.
    pub chunks: Vec<ChunkRecord>,
}

/// Full record of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name (`malloc`, `merge`, or `data`).
    pub scenario: &'static str,
    /// Chunk tables captured after every step.
    pub steps: Vec<StepReport>,
    /// Heap counters at the end of the run.
    pub metrics: MetricsSnapshot,
}

/// Operations attempted by an exercise run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OpTally {
    /// Plain allocations that succeeded.
    pub allocates: u64,
    /// Zero-filled allocations that succeeded.
    pub zeroed_allocates: u64,
    /// Resize moves that succeeded.
    pub resizes: u64,
    /// Releases of live handles.
    pub releases: u64,
    /// Requests the break ceiling denied.
    pub denied: u64,
}

/// Summary of a seeded exercise run.
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseReport {
    /// Seed that drove the operation sequence.
    pub seed: u64,
    /// Steps executed.
    pub steps: u32,
    /// Slot-array width (bound on live handles).
    pub slots: usize,
    /// Break ceiling, when one was set.
    pub ceiling: Option<usize>,
    /// What the run attempted.
    pub ops: OpTally,
    /// Directory validations that passed (one per step).
    pub validations: u64,
    /// Highest break position observed.
    pub peak_high_water: usize,
    /// Directory walk at the end of the run.
    pub final_chunks: Vec<ChunkRecord>,
    /// Heap counters at the end of the run.
    pub metrics: MetricsSnapshot,
}
