//! Seeded random workload for soak-style runs.
//!
//! Drives the heap through a bounded slot array of live handles, checks
//! every payload against its content tag, and revalidates the directory
//! after every step. The run is fully determined by its seed.

use brkalloc_core::{Heap, HeapConfig, HeapError, SimBreak};

use crate::report::{ExerciseReport, HarnessError, OpTally};

/// Knobs for a seeded run.
#[derive(Debug, Clone, Copy)]
pub struct ExerciseConfig {
    /// Seed for the operation stream.
    pub seed: u64,
    /// Operations to attempt.
    pub steps: u32,
    /// Width of the live-handle slot array.
    pub slots: usize,
    /// Break ceiling in bytes, when the run should hit exhaustion.
    pub ceiling: Option<usize>,
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            seed: 0xC0FFEE,
            steps: 4096,
            slots: 32,
            ceiling: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // xorshift64* needs nonzero state.
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

#[derive(Clone, Copy)]
struct LiveSlot {
    handle: usize,
    size: usize,
    tag: u8,
}

/// Runs a seeded workload and summarizes what happened.
///
/// A slot width of zero is clamped to one; the report echoes the value
/// actually used. The heap is left undrained so the final chunk table
/// shows the surviving live set.
pub fn run_exercise(config: ExerciseConfig) -> Result<ExerciseReport, HarnessError> {
    let heap = match config.ceiling {
        Some(ceiling) => {
            Heap::with_config(HeapConfig::from_env(), SimBreak::with_ceiling(ceiling))
        }
        None => Heap::with_config(HeapConfig::from_env(), SimBreak::new()),
    };
    let slot_count = config.slots.max(1);
    let mut rng = XorShift64::new(config.seed);
    let mut slots: Vec<Option<LiveSlot>> = vec![None; slot_count];
    let mut ops = OpTally::default();
    let mut validations = 0u64;
    let mut peak_high_water = 0usize;

    for step in 0..config.steps {
        let roll = rng.gen_range_usize(0, 99);
        let idx = rng.gen_range_usize(0, slot_count - 1);

        match roll {
            // Allocate, evicting any previous tenant of the slot.
            0..=44 => {
                if let Some(old) = slots[idx].take() {
                    verify(&heap, old, step)?;
                    heap.release(old.handle)?;
                    ops.releases += 1;
                }
                let size = rng.gen_range_usize(1, 768);
                let tag = (rng.next_u64() & 0xFF) as u8;
                match heap.allocate(size) {
                    Ok(handle) => {
                        let slot = LiveSlot { handle, size, tag };
                        fill(&heap, slot)?;
                        slots[idx] = Some(slot);
                        ops.allocates += 1;
                    }
                    Err(err) => deny(err, config.ceiling, &mut ops)?,
                }
            }
            // Zeroed allocate into an empty slot.
            45..=59 => {
                if slots[idx].is_none() {
                    let count = rng.gen_range_usize(1, 32);
                    let element = rng.gen_range_usize(1, 16);
                    match heap.allocate_zeroed(count, element) {
                        Ok(handle) => {
                            let size = count * element;
                            check_zeroed(&heap, handle, size, step)?;
                            let tag = (rng.next_u64() & 0xFF) as u8;
                            let slot = LiveSlot { handle, size, tag };
                            fill(&heap, slot)?;
                            slots[idx] = Some(slot);
                            ops.zeroed_allocates += 1;
                        }
                        Err(err) => deny(err, config.ceiling, &mut ops)?,
                    }
                }
            }
            // Resize a live slot; its prefix must carry over. A denied
            // resize leaves the old handle live, so the slot stays.
            60..=74 => {
                if let Some(slot) = slots[idx] {
                    let new_size = rng.gen_range_usize(1, 768);
                    match heap.resize(Some(slot.handle), new_size) {
                        Ok(Some(new_handle)) => {
                            let kept = slot.size.min(new_size);
                            let bytes = heap.read(new_handle, 0, kept)?;
                            if bytes.iter().any(|&byte| byte != slot.tag) {
                                return Err(HarnessError::Verification(format!(
                                    "step {step}: resize dropped the retained prefix at {new_handle:#x}"
                                )));
                            }
                            let tag = (rng.next_u64() & 0xFF) as u8;
                            let next = LiveSlot {
                                handle: new_handle,
                                size: new_size,
                                tag,
                            };
                            fill(&heap, next)?;
                            slots[idx] = Some(next);
                            ops.resizes += 1;
                        }
                        Ok(None) => {
                            return Err(HarnessError::Verification(format!(
                                "step {step}: resize to {new_size} returned no handle"
                            )));
                        }
                        Err(err) => deny(err, config.ceiling, &mut ops)?,
                    }
                }
            }
            // Release a live slot.
            _ => {
                if let Some(slot) = slots[idx].take() {
                    verify(&heap, slot, step)?;
                    heap.release(slot.handle)?;
                    ops.releases += 1;
                }
            }
        }

        heap.validate().map_err(HarnessError::Invariant)?;
        validations += 1;
        peak_high_water = peak_high_water.max(heap.high_water());
    }

    Ok(ExerciseReport {
        seed: config.seed,
        steps: config.steps,
        slots: slot_count,
        ceiling: config.ceiling,
        ops,
        validations,
        peak_high_water,
        final_chunks: heap.dump_state(),
        metrics: heap.metrics().snapshot(),
    })
}

fn fill(heap: &Heap, slot: LiveSlot) -> Result<(), HeapError> {
    heap.write(slot.handle, 0, &vec![slot.tag; slot.size])
}

fn verify(heap: &Heap, slot: LiveSlot, step: u32) -> Result<(), HarnessError> {
    let bytes = heap.read(slot.handle, 0, slot.size)?;
    if let Some(position) = bytes.iter().position(|&byte| byte != slot.tag) {
        return Err(HarnessError::Verification(format!(
            "step {step}: handle {:#x} lost tag {:#04x} at byte {position}",
            slot.handle, slot.tag
        )));
    }
    Ok(())
}

fn check_zeroed(
    heap: &Heap,
    handle: usize,
    size: usize,
    step: u32,
) -> Result<(), HarnessError> {
    let bytes = heap.read(handle, 0, size)?;
    if bytes.iter().any(|&byte| byte != 0) {
        return Err(HarnessError::Verification(format!(
            "step {step}: zeroed payload at {handle:#x} holds stale bytes"
        )));
    }
    Ok(())
}

fn deny(err: HeapError, ceiling: Option<usize>, ops: &mut OpTally) -> Result<(), HarnessError> {
    match err {
        HeapError::ResourceExhausted if ceiling.is_some() => {
            ops.denied += 1;
            Ok(())
        }
        other => Err(HarnessError::Heap(other)),
    }
}
