//! Atomic counters for heap observability.
//!
//! All counters use relaxed ordering; they are advisory/diagnostic,
//! not synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-heap operation counters.
pub struct HeapMetrics {
    /// Chunks handed out, across all paths.
    pub allocations: AtomicU64,
    /// Zero-filled allocations.
    pub zeroed_allocations: AtomicU64,
    /// Resize operations completed.
    pub resizes: AtomicU64,
    /// Chunks given back by callers.
    pub releases: AtomicU64,
    /// Allocations served from an existing free chunk.
    pub reuses: AtomicU64,
    /// Free chunks carved in two on the reuse path.
    pub splits: AtomicU64,
    /// Free neighbors folded together on release.
    pub coalesces: AtomicU64,
    /// Arena growth calls that succeeded.
    pub grows: AtomicU64,
    /// Topmost chunks given back to the break.
    pub shrinks: AtomicU64,
    /// Arena growth calls the break refused.
    pub grow_failures: AtomicU64,
    /// Repeated releases of the same handle.
    pub double_releases: AtomicU64,
    /// Operations on handles no chunk answers to.
    pub unknown_handles: AtomicU64,
}

impl HeapMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            zeroed_allocations: AtomicU64::new(0),
            resizes: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            splits: AtomicU64::new(0),
            coalesces: AtomicU64::new(0),
            grows: AtomicU64::new(0),
            shrinks: AtomicU64::new(0),
            grow_failures: AtomicU64::new(0),
            double_releases: AtomicU64::new(0),
            unknown_handles: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `delta` to a counter.
    pub fn add(counter: &AtomicU64, delta: u64) {
        counter.fetch_add(delta, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters into a displayable summary.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allocations: Self::get(&self.allocations),
            zeroed_allocations: Self::get(&self.zeroed_allocations),
            resizes: Self::get(&self.resizes),
            releases: Self::get(&self.releases),
            reuses: Self::get(&self.reuses),
            splits: Self::get(&self.splits),
            coalesces: Self::get(&self.coalesces),
            grows: Self::get(&self.grows),
            shrinks: Self::get(&self.shrinks),
            grow_failures: Self::get(&self.grow_failures),
            double_releases: Self::get(&self.double_releases),
            unknown_handles: Self::get(&self.unknown_handles),
        }
    }
}

impl Default for HeapMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all heap counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub allocations: u64,
    pub zeroed_allocations: u64,
    pub resizes: u64,
    pub releases: u64,
    pub reuses: u64,
    pub splits: u64,
    pub coalesces: u64,
    pub grows: u64,
    pub shrinks: u64,
    pub grow_failures: u64,
    pub double_releases: u64,
    pub unknown_handles: u64,
}
