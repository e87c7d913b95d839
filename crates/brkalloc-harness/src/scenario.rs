//! The three fixed workloads from the original driver.
//!
//! Each workload captures the chunk table at the same points the driver
//! printed it, so a run can be eyeballed against the known-good output.

use brkalloc_core::{Heap, HeapConfig, SimBreak};

use crate::report::{HarnessError, ScenarioReport, StepReport};

const INT_SIZE: usize = std::mem::size_of::<i32>();

/// Which fixed workload to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    /// Three chunks, release the middle one, allocate into the hole.
    Malloc,
    /// Three neighbors released in an order that forces both merge
    /// directions and ends with the break back at zero.
    Merge,
    /// Integers stored through a zeroed allocation, then the list grown.
    Data,
}

impl ScenarioKind {
    /// Every scenario, in the driver's order.
    pub const ALL: [ScenarioKind; 3] = [Self::Malloc, Self::Merge, Self::Data];

    /// Parses a scenario name, case-insensitively.
    #[must_use]
    pub fn from_str_loose(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "malloc" => Some(Self::Malloc),
            "merge" => Some(Self::Merge),
            "data" => Some(Self::Data),
            _ => None,
        }
    }

    /// Canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malloc => "malloc",
            Self::Merge => "merge",
            Self::Data => "data",
        }
    }
}

/// Runs one workload on a fresh heap and collects the step-by-step record.
pub fn run_scenario(kind: ScenarioKind) -> Result<ScenarioReport, HarnessError> {
    let heap = Heap::with_config(HeapConfig::from_env(), SimBreak::new());
    let mut steps = Vec::new();
    match kind {
        ScenarioKind::Malloc => run_malloc(&heap, &mut steps)?,
        ScenarioKind::Merge => run_merge(&heap, &mut steps)?,
        ScenarioKind::Data => run_data(&heap, &mut steps)?,
    }
    Ok(ScenarioReport {
        scenario: kind.as_str(),
        steps,
        metrics: heap.metrics().snapshot(),
    })
}

/// Checks the directory and captures the chunk table for one step.
fn step(
    heap: &Heap,
    steps: &mut Vec<StepReport>,
    label: &str,
    notes: Vec<String>,
) -> Result<(), HarnessError> {
    heap.validate().map_err(HarnessError::Invariant)?;
    steps.push(StepReport {
        label: label.to_string(),
        notes,
        chunks: heap.dump_state(),
    });
    Ok(())
}

fn run_malloc(heap: &Heap, steps: &mut Vec<StepReport>) -> Result<(), HarnessError> {
    step(heap, steps, "initial heap", Vec::new())?;

    let _a = heap.allocate(20)?;
    let b = heap.allocate(200)?;
    let _c = heap.allocate(100)?;
    step(heap, steps, "after allocate 20, 200, 100", Vec::new())?;

    heap.release(b)?;
    step(heap, steps, "after release of the 200-byte chunk", Vec::new())?;

    // The freed chunk is wide enough to split: the request comes back
    // at the released handle and a free remainder keeps the rest.
    let d = heap.allocate(60)?;
    step(heap, steps, "after allocate 60 into the hole", Vec::new())?;

    if d != b {
        return Err(HarnessError::Verification(format!(
            "expected the 60-byte allocation to land at the released handle {b:#x}, got {d:#x}"
        )));
    }
    Ok(())
}

fn run_merge(heap: &Heap, steps: &mut Vec<StepReport>) -> Result<(), HarnessError> {
    let a = heap.allocate(20)?;
    let b = heap.allocate(30)?;
    let c = heap.allocate(100)?;
    step(heap, steps, "after allocate 20, 30, 100", Vec::new())?;

    // Both neighbors are in use, so nothing merges yet.
    heap.release(b)?;
    step(heap, steps, "after release of the middle chunk", Vec::new())?;

    // The first chunk absorbs its free right neighbor.
    heap.release(a)?;
    step(heap, steps, "after release of the first chunk", Vec::new())?;

    // The merged span absorbs the topmost chunk and the whole heap
    // goes back to the break.
    heap.release(c)?;
    step(heap, steps, "after release of the last chunk", Vec::new())?;

    if heap.chunk_count() != 0 || heap.high_water() != 0 {
        return Err(HarnessError::Verification(format!(
            "expected an empty heap after the drain, found {} chunks at break {:#x}",
            heap.chunk_count(),
            heap.high_water(),
        )));
    }
    Ok(())
}

fn run_data(heap: &Heap, steps: &mut Vec<StepReport>) -> Result<(), HarnessError> {
    let len = 5usize;
    let list = heap.allocate_zeroed(len, INT_SIZE)?;
    for index in 0..len {
        let value = read_int(heap, list, index)?;
        if value != 0 {
            return Err(HarnessError::Verification(format!(
                "zeroed allocation handed back {value} at index {index}"
            )));
        }
    }
    step(
        heap,
        steps,
        "after zeroed allocate of 5 ints",
        vec![format!("all {len} ints read back zero")],
    )?;

    for index in 0..len {
        write_int(heap, list, index, (index as i32) * 10)?;
    }
    step(heap, steps, "after filling the list", list_notes(heap, list, len)?)?;

    let list = heap
        .resize(Some(list), 2 * len * INT_SIZE)?
        .ok_or_else(|| {
            HarnessError::Verification("growing the list returned no handle".to_string())
        })?;
    for index in 0..len {
        let value = read_int(heap, list, index)?;
        if value != (index as i32) * 10 {
            return Err(HarnessError::Verification(format!(
                "index {index} lost its value across the move: {value}"
            )));
        }
    }
    step(
        heap,
        steps,
        "after resize to 10 ints",
        vec![format!("first {len} ints retained across the move")],
    )?;

    for index in len..2 * len {
        write_int(heap, list, index, (index as i32) * 10)?;
    }
    step(
        heap,
        steps,
        "after filling the extension",
        list_notes(heap, list, 2 * len)?,
    )?;

    heap.release(list)?;
    step(heap, steps, "after release of the list", Vec::new())?;
    Ok(())
}

fn write_int(
    heap: &Heap,
    handle: usize,
    index: usize,
    value: i32,
) -> Result<(), brkalloc_core::HeapError> {
    heap.write(handle, index * INT_SIZE, &value.to_le_bytes())
}

fn read_int(
    heap: &Heap,
    handle: usize,
    index: usize,
) -> Result<i32, brkalloc_core::HeapError> {
    let bytes = heap.read(handle, index * INT_SIZE, INT_SIZE)?;
    let mut buf = [0u8; INT_SIZE];
    buf.copy_from_slice(&bytes);
    Ok(i32::from_le_bytes(buf))
}

fn list_notes(heap: &Heap, handle: usize, len: usize) -> Result<Vec<String>, HarnessError> {
    let mut notes = Vec::with_capacity(len);
    for index in 0..len {
        notes.push(format!("list[{index}] = {}", read_int(heap, handle, index)?));
    }
    Ok(notes)
}
