use std::collections::HashSet;

use brkalloc_core::{Heap, HeapError};
use serde_json::json;

const TARGET_OPS_RELEASE: usize = 120_000;
const TARGET_OPS_DEBUG: usize = 30_000;
const VALIDATE_STRIDE: usize = 4_096;

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

#[derive(Clone, Copy, Debug)]
enum StormKind {
    Sawtooth,
    InverseSawtooth,
    RandomChurn,
    SizeClassThrash,
    CeilingExhaustion,
}

impl StormKind {
    fn as_str(self) -> &'static str {
        match self {
            StormKind::Sawtooth => "sawtooth",
            StormKind::InverseSawtooth => "inverse_sawtooth",
            StormKind::RandomChurn => "random_churn",
            StormKind::SizeClassThrash => "size_class_thrash",
            StormKind::CeilingExhaustion => "ceiling_exhaustion",
        }
    }

    fn all() -> [StormKind; 5] {
        [
            StormKind::Sawtooth,
            StormKind::InverseSawtooth,
            StormKind::RandomChurn,
            StormKind::SizeClassThrash,
            StormKind::CeilingExhaustion,
        ]
    }
}

#[derive(Clone, Copy, Debug)]
struct AllocationRec {
    handle: usize,
    size: usize,
    tag: u8,
}

#[derive(Debug, Clone)]
struct StormReport {
    storm: &'static str,
    ops_count: usize,
    denials: u64,
    fragmentation_ratio: f64,
    peak_high_water: usize,
    peak_live_bytes: usize,
}

struct StormRunner {
    heap: Heap,
    slots: Vec<Option<AllocationRec>>,
    rng: XorShift64,
    target_ops: usize,
    ops_count: usize,
    live_bytes: usize,
    peak_live_bytes: usize,
    denials: u64,
    frag_ratio_sum: f64,
    frag_samples: usize,
    peak_high_water: usize,
    next_cursor: usize,
}

impl StormRunner {
    fn new(seed: u64, slot_capacity: usize, ceiling: Option<usize>) -> Self {
        let heap = match ceiling {
            Some(bytes) => Heap::with_ceiling(bytes),
            None => Heap::new(),
        };
        Self {
            heap,
            slots: vec![None; slot_capacity],
            rng: XorShift64::new(seed),
            target_ops: if cfg!(debug_assertions) {
                TARGET_OPS_DEBUG
            } else {
                TARGET_OPS_RELEASE
            },
            ops_count: 0,
            live_bytes: 0,
            peak_live_bytes: 0,
            denials: 0,
            frag_ratio_sum: 0.0,
            frag_samples: 0,
            peak_high_water: 0,
            next_cursor: 0,
        }
    }

    fn bump(&mut self) {
        self.ops_count += 1;
        let high_water = self.heap.high_water();
        self.peak_high_water = self.peak_high_water.max(high_water);
        if high_water > 0 {
            self.frag_ratio_sum += self.heap.free_bytes() as f64 / high_water as f64;
            self.frag_samples += 1;
        }
        if self.ops_count % VALIDATE_STRIDE == 0 {
            if let Err(violation) = self.heap.validate() {
                panic!("directory invalid after {} ops: {violation}", self.ops_count);
            }
        }
    }

    fn allocate_at(&mut self, idx: usize, size: usize) -> bool {
        if self.slots[idx].is_some() {
            self.bump();
            return false;
        }
        match self.heap.allocate(size) {
            Ok(handle) => {
                let tag = (self.rng.next_u64() & 0xFF) as u8;
                self.heap
                    .write(handle, 0, &vec![tag; size])
                    .unwrap_or_else(|err| panic!("fill handle {handle:#x}: {err}"));
                self.slots[idx] = Some(AllocationRec { handle, size, tag });
                self.live_bytes += size;
                self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
                self.bump();
                true
            }
            Err(HeapError::ResourceExhausted) => {
                self.denials += 1;
                self.bump();
                false
            }
            Err(other) => panic!("allocate({size}) failed: {other}"),
        }
    }

    fn free_at(&mut self, idx: usize) -> bool {
        let Some(rec) = self.slots[idx] else {
            self.bump();
            return false;
        };
        let bytes = self
            .heap
            .read(rec.handle, 0, rec.size)
            .unwrap_or_else(|err| panic!("read back handle {:#x}: {err}", rec.handle));
        assert!(
            bytes.iter().all(|&byte| byte == rec.tag),
            "slot {idx} handle {:#x} lost tag {:#04x}",
            rec.handle,
            rec.tag
        );
        self.heap
            .release(rec.handle)
            .unwrap_or_else(|err| panic!("release handle {:#x}: {err}", rec.handle));
        self.slots[idx] = None;
        self.live_bytes -= rec.size;
        self.bump();
        true
    }

    fn random_live_index(&mut self) -> Option<usize> {
        if self.slots.iter().all(|slot| slot.is_none()) {
            return None;
        }
        for _ in 0..self.slots.len() {
            let idx = self.rng.gen_range(0, self.slots.len() - 1);
            if self.slots[idx].is_some() {
                return Some(idx);
            }
        }
        self.slots.iter().position(|slot| slot.is_some())
    }

    fn random_empty_index(&mut self) -> Option<usize> {
        if self.slots.iter().all(|slot| slot.is_some()) {
            return None;
        }
        for _ in 0..self.slots.len() {
            let idx = self.rng.gen_range(0, self.slots.len() - 1);
            if self.slots[idx].is_none() {
                return Some(idx);
            }
        }
        self.slots.iter().position(|slot| slot.is_none())
    }

    fn next_round_robin_index<F>(&mut self, mut predicate: F) -> Option<usize>
    where
        F: FnMut(&Option<AllocationRec>) -> bool,
    {
        for _ in 0..self.slots.len() {
            let idx = self.next_cursor % self.slots.len();
            self.next_cursor = self.next_cursor.wrapping_add(1);
            if predicate(&self.slots[idx]) {
                return Some(idx);
            }
        }
        None
    }

    fn run_sawtooth(&mut self) {
        while self.ops_count < self.target_ops {
            let phase = self.ops_count % (self.slots.len() * 2);
            if phase < self.slots.len() {
                let idx = phase;
                let size = 32 + ((phase * 37) % 1_504);
                if !self.allocate_at(idx, size) {
                    let _ = self.free_at(idx);
                }
            } else {
                let idx = phase - self.slots.len();
                if idx % 2 == 0 {
                    if !self.free_at(idx) {
                        let size = 32 + ((idx * 19) % 992);
                        let _ = self.allocate_at(idx, size);
                    }
                } else {
                    let size = 64 + ((idx * 23) % 512);
                    if !self.allocate_at(idx, size) {
                        let _ = self.free_at(idx);
                    }
                }
            }
        }
    }

    fn run_inverse_sawtooth(&mut self) {
        while self.ops_count < self.target_ops {
            let phase = self.ops_count % (self.slots.len() * 2);
            if phase < self.slots.len() {
                let idx = self.slots.len() - 1 - phase;
                let size = 16 + ((phase * 11) % 1_264);
                if !self.allocate_at(idx, size) {
                    let _ = self.free_at(idx);
                }
            } else {
                let idx = self.slots.len() - 1 - (phase - self.slots.len());
                if !self.free_at(idx) {
                    let size = 32 + ((idx * 41) % 768);
                    let _ = self.allocate_at(idx, size);
                }
            }
        }
    }

    fn run_random_churn(&mut self) {
        while self.ops_count < self.target_ops {
            let want_alloc = (self.rng.next_u64() & 1) == 0;
            if want_alloc {
                if let Some(idx) = self.random_empty_index() {
                    let size = self.rng.gen_range(16, 2_048);
                    let _ = self.allocate_at(idx, size);
                } else if let Some(idx) = self.random_live_index() {
                    let _ = self.free_at(idx);
                }
            } else if let Some(idx) = self.random_live_index() {
                let _ = self.free_at(idx);
            } else if let Some(idx) = self.random_empty_index() {
                let size = self.rng.gen_range(16, 1_024);
                let _ = self.allocate_at(idx, size);
            }
        }
    }

    fn run_size_class_thrash(&mut self) {
        let size_classes = [16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512, 1_024];
        while self.ops_count < self.target_ops {
            let idx = self.rng.gen_range(0, self.slots.len() - 1);
            let class_idx = self.rng.gen_range(0, size_classes.len() - 1);
            let size = size_classes[class_idx];
            if self.ops_count % 3 == 0 {
                if !self.free_at(idx) {
                    let _ = self.allocate_at(idx, size);
                }
            } else if !self.allocate_at(idx, size) {
                let _ = self.free_at(idx);
            }
        }
    }

    fn run_ceiling_exhaustion(&mut self) {
        while self.ops_count < self.target_ops {
            if let Some(idx) = self.next_round_robin_index(|slot| slot.is_none()) {
                let size = 32 + ((idx * 53) % 992);
                if !self.allocate_at(idx, size) {
                    // Ceiling hit: give a batch back before refilling.
                    for _ in 0..self.slots.len() / 4 {
                        if let Some(live) = self.next_round_robin_index(|slot| slot.is_some()) {
                            let _ = self.free_at(live);
                        }
                    }
                }
            } else if let Some(idx) = self.next_round_robin_index(|slot| slot.is_some()) {
                let _ = self.free_at(idx);
            }
        }
    }

    fn run_storm(&mut self, storm: StormKind) {
        match storm {
            StormKind::Sawtooth => self.run_sawtooth(),
            StormKind::InverseSawtooth => self.run_inverse_sawtooth(),
            StormKind::RandomChurn => self.run_random_churn(),
            StormKind::SizeClassThrash => self.run_size_class_thrash(),
            StormKind::CeilingExhaustion => self.run_ceiling_exhaustion(),
        }
    }

    fn verify_integrity(&self) {
        let mut handles = HashSet::new();
        for (idx, rec) in self.slots.iter().enumerate() {
            let Some(rec) = rec else { continue };
            assert!(
                handles.insert(rec.handle),
                "slot {idx} duplicates handle {:#x}",
                rec.handle
            );
            let bytes = self
                .heap
                .read(rec.handle, 0, rec.size)
                .unwrap_or_else(|err| panic!("read live slot {idx}: {err}"));
            assert!(
                bytes.iter().all(|&byte| byte == rec.tag),
                "slot {idx} handle {:#x} lost its tag",
                rec.handle
            );
        }
        if let Err(violation) = self.heap.validate() {
            panic!("directory invalid at storm end: {violation}");
        }
    }

    fn cleanup_all(&mut self) {
        for idx in 0..self.slots.len() {
            if self.slots[idx].is_some() {
                let _ = self.free_at(idx);
            }
        }
        assert_eq!(self.heap.chunk_count(), 0, "chunks left after drain");
        assert_eq!(self.heap.high_water(), 0, "break left high after drain");
    }

    fn finish(&mut self, storm: StormKind) -> StormReport {
        self.verify_integrity();
        let fragmentation_ratio = if self.frag_samples == 0 {
            0.0
        } else {
            self.frag_ratio_sum / self.frag_samples as f64
        };
        let report = StormReport {
            storm: storm.as_str(),
            ops_count: self.ops_count,
            denials: self.denials,
            fragmentation_ratio,
            peak_high_water: self.peak_high_water,
            peak_live_bytes: self.peak_live_bytes,
        };
        self.cleanup_all();
        report
    }
}

fn run_single_storm(storm: StormKind) -> StormReport {
    let seed = match storm {
        StormKind::Sawtooth => 0xA11CE,
        StormKind::InverseSawtooth => 0xBEEF,
        StormKind::RandomChurn => 0xC0FFEE,
        StormKind::SizeClassThrash => 0xD00D,
        StormKind::CeilingExhaustion => 0xE1F,
    };

    let slot_capacity = if cfg!(debug_assertions) { 96 } else { 128 };
    // The exhaustion storm gets a ceiling the full slot array cannot fit
    // under, so the break is guaranteed to refuse mid-fill.
    let ceiling =
        matches!(storm, StormKind::CeilingExhaustion).then_some(slot_capacity * 512);

    let mut runner = StormRunner::new(seed, slot_capacity, ceiling);
    runner.run_storm(storm);
    runner.finish(storm)
}

#[test]
fn fragmentation_storms_hold_invariants_and_emit_metrics() {
    let reports: Vec<StormReport> = StormKind::all().into_iter().map(run_single_storm).collect();

    let min_ops_required = if cfg!(debug_assertions) {
        TARGET_OPS_DEBUG
    } else {
        TARGET_OPS_RELEASE
    };

    for report in &reports {
        assert!(
            report.ops_count >= min_ops_required,
            "storm {} ran insufficient ops: {}",
            report.storm,
            report.ops_count
        );
        if report.storm == "ceiling_exhaustion" {
            assert!(report.denials > 0, "exhaustion storm never hit the ceiling");
        } else {
            assert_eq!(
                report.denials, 0,
                "storm {} was denied without a ceiling",
                report.storm
            );
        }
    }

    let payload = json!({
        "storm_results": reports.iter().map(|r| json!({
            "storm": r.storm,
            "ops_count": r.ops_count,
            "denials": r.denials,
            "fragmentation_ratio": r.fragmentation_ratio,
            "peak_high_water": r.peak_high_water,
            "peak_live_bytes": r.peak_live_bytes,
        })).collect::<Vec<_>>()
    });

    println!("FRAGMENTATION_STORM_REPORT {payload}");
}
