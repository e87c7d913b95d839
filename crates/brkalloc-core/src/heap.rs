//! Heap facade.
//!
//! One owned context per heap: the arena, the chunk directory, and the
//! lifecycle log sit behind a single `parking_lot::Mutex`, with atomic
//! counters alongside. Every public operation takes the lock once and
//! holds it to completion, so concurrent callers observe each other's
//! effects entirely or not at all. The coarse lock serializes unrelated
//! requests; per-size-class or per-thread arenas are out of scope.

use parking_lot::Mutex;

use crate::align::align_up;
use crate::arena::Arena;
use crate::brk::{ProgramBreak, SimBreak};
use crate::chunk::{ChunkDirectory, ChunkRecord, HEADER_SIZE};
use crate::config::{DoubleReleasePolicy, HeapConfig};
use crate::error::HeapError;
use crate::metrics::HeapMetrics;

/// Heap lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured heap lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this lifecycle record.
    pub trace_id: String,
    /// Severity level.
    pub level: HeapLogLevel,
    /// API symbol (`allocate`, `allocate_zeroed`, `resize`, `release`).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `grow_denied`, `release`, ...).
    pub event: &'static str,
    /// Payload handle involved in the event.
    pub handle: Option<usize>,
    /// Size value involved in the event.
    pub size: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Snapshot: chunks currently linked in the directory.
    pub chunk_count: usize,
    /// Snapshot: free payload bytes across the directory.
    pub free_bytes: usize,
    /// Snapshot: arena high-water mark.
    pub high_water: usize,
}

/// Locked interior of a heap: arena, directory, lifecycle log.
struct HeapState<B: ProgramBreak> {
    arena: Arena<B>,
    directory: ChunkDirectory,
    /// Monotonic lifecycle decision id.
    next_decision_id: u64,
    /// Structured heap lifecycle records.
    lifecycle_logs: Vec<HeapLogRecord>,
}

impl<B: ProgramBreak> HeapState<B> {
    fn next_log_decision_id(&mut self) -> u64 {
        let id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn record_lifecycle(
        &mut self,
        level: HeapLogLevel,
        symbol: &'static str,
        event: &'static str,
        handle: Option<usize>,
        size: Option<usize>,
        outcome: &'static str,
        details: impl Into<String>,
    ) {
        let decision_id = self.next_log_decision_id();
        let trace_id = format!("core::heap::{}::{:016x}", symbol, decision_id);
        let chunk_count = self.directory.len();
        let free_bytes = self.directory.free_bytes();
        let high_water = self.arena.high_water();
        self.lifecycle_logs.push(HeapLogRecord {
            decision_id,
            trace_id,
            level,
            symbol,
            event,
            handle,
            size,
            outcome,
            details: details.into(),
            chunk_count,
            free_bytes,
            high_water,
        });
    }

    /// Acquires a chunk for `size` payload bytes.
    ///
    /// Returns the payload handle and the granted payload size, which may
    /// exceed the aligned request when a free chunk was handed out whole.
    fn allocate_chunk(
        &mut self,
        size: usize,
        metrics: &HeapMetrics,
    ) -> Result<(usize, usize), HeapError> {
        if size == 0 {
            self.record_lifecycle(
                HeapLogLevel::Warn,
                "allocate",
                "zero_size_request",
                None,
                Some(0),
                "denied",
                "",
            );
            return Err(HeapError::InvalidRequest);
        }
        let Some(target) = align_up(size) else {
            self.record_lifecycle(
                HeapLogLevel::Warn,
                "allocate",
                "align_overflow",
                None,
                Some(size),
                "denied",
                "padded_size_left_address_range",
            );
            return Err(HeapError::ArithmeticOverflow);
        };

        if let Some(offset) = self.directory.first_fit(target) {
            let did_split = self.directory.split(offset, target);
            if did_split {
                HeapMetrics::inc(&metrics.splits);
            }
            self.directory.mark_in_use(offset);
            HeapMetrics::inc(&metrics.reuses);
            HeapMetrics::inc(&metrics.allocations);
            let granted = self.directory.get(offset).map_or(target, |c| c.payload_size);
            let handle = offset + HEADER_SIZE;
            self.record_lifecycle(
                HeapLogLevel::Trace,
                "allocate",
                "alloc",
                Some(handle),
                Some(target),
                "success",
                format!("path=first_fit split={did_split} granted={granted}"),
            );
            return Ok((handle, granted));
        }

        let Some(request) = target.checked_add(HEADER_SIZE) else {
            self.record_lifecycle(
                HeapLogLevel::Warn,
                "allocate",
                "align_overflow",
                None,
                Some(size),
                "denied",
                "span_left_address_range",
            );
            return Err(HeapError::ArithmeticOverflow);
        };
        let Some(offset) = self.arena.grow(request) else {
            HeapMetrics::inc(&metrics.grow_failures);
            self.record_lifecycle(
                HeapLogLevel::Warn,
                "allocate",
                "grow_denied",
                None,
                Some(request),
                "oom",
                format!("high_water={:#x}", self.arena.high_water()),
            );
            return Err(HeapError::ResourceExhausted);
        };
        HeapMetrics::inc(&metrics.grows);
        self.directory.push_top(offset, target, false);
        HeapMetrics::inc(&metrics.allocations);
        let handle = offset + HEADER_SIZE;
        self.record_lifecycle(
            HeapLogLevel::Trace,
            "allocate",
            "alloc",
            Some(handle),
            Some(target),
            "success",
            format!("path=arena_grow break={:#x}", self.arena.high_water()),
        );
        Ok((handle, target))
    }

    fn allocate_zeroed(
        &mut self,
        count: usize,
        element_size: usize,
        metrics: &HeapMetrics,
    ) -> Result<usize, HeapError> {
        if count == 0 || element_size == 0 {
            self.record_lifecycle(
                HeapLogLevel::Warn,
                "allocate_zeroed",
                "zero_size_request",
                None,
                None,
                "denied",
                format!("count={count} elem_size={element_size}"),
            );
            return Err(HeapError::InvalidRequest);
        }
        let Some(total) = count.checked_mul(element_size) else {
            self.record_lifecycle(
                HeapLogLevel::Warn,
                "allocate_zeroed",
                "zeroed_overflow",
                None,
                None,
                "denied",
                format!("count={count} elem_size={element_size}"),
            );
            return Err(HeapError::ArithmeticOverflow);
        };

        let (handle, granted) = self.allocate_chunk(total, metrics)?;
        // The whole granted payload is scrubbed, not just the request.
        self.arena.zero(handle, granted);
        HeapMetrics::inc(&metrics.zeroed_allocations);
        self.record_lifecycle(
            HeapLogLevel::Trace,
            "allocate_zeroed",
            "zeroed_alloc",
            Some(handle),
            Some(total),
            "success",
            format!("count={count} elem_size={element_size} granted={granted}"),
        );
        Ok(handle)
    }

    fn resize(
        &mut self,
        handle: Option<usize>,
        new_size: usize,
        metrics: &HeapMetrics,
        policy: DoubleReleasePolicy,
    ) -> Result<Option<usize>, HeapError> {
        let Some(old_handle) = handle else {
            let (new_handle, _) = self.allocate_chunk(new_size, metrics)?;
            HeapMetrics::inc(&metrics.resizes);
            self.record_lifecycle(
                HeapLogLevel::Trace,
                "resize",
                "resize_fresh",
                Some(new_handle),
                Some(new_size),
                "success",
                "handle_was_absent",
            );
            return Ok(Some(new_handle));
        };

        if new_size == 0 {
            self.release(old_handle, metrics, policy)?;
            HeapMetrics::inc(&metrics.resizes);
            self.record_lifecycle(
                HeapLogLevel::Trace,
                "resize",
                "resize_release",
                Some(old_handle),
                Some(0),
                "released",
                "new_size_was_zero",
            );
            return Ok(None);
        }

        let old_payload = match old_handle
            .checked_sub(HEADER_SIZE)
            .and_then(|offset| self.directory.get(offset))
        {
            Some(header) if !header.is_free => header.payload_size,
            _ => {
                HeapMetrics::inc(&metrics.unknown_handles);
                self.record_lifecycle(
                    HeapLogLevel::Warn,
                    "resize",
                    "unknown_handle",
                    Some(old_handle),
                    Some(new_size),
                    "fault",
                    "source_handle_not_allocated",
                );
                return Err(HeapError::UnknownHandle { handle: old_handle });
            }
        };

        // The old chunk stays valid and untouched when this allocation fails.
        let (new_handle, _) = self.allocate_chunk(new_size, metrics)?;
        let copied = old_payload.min(new_size);
        self.arena.copy(old_handle, new_handle, copied);
        self.release(old_handle, metrics, policy)?;
        HeapMetrics::inc(&metrics.resizes);
        self.record_lifecycle(
            HeapLogLevel::Trace,
            "resize",
            "resize_move",
            Some(new_handle),
            Some(new_size),
            "success",
            format!("old_handle={old_handle:#x} old_payload={old_payload} copied={copied}"),
        );
        Ok(Some(new_handle))
    }

    fn release(
        &mut self,
        handle: usize,
        metrics: &HeapMetrics,
        policy: DoubleReleasePolicy,
    ) -> Result<(), HeapError> {
        let header = match handle
            .checked_sub(HEADER_SIZE)
            .and_then(|offset| self.directory.get(offset))
        {
            Some(header) => header,
            None => {
                HeapMetrics::inc(&metrics.unknown_handles);
                self.record_lifecycle(
                    HeapLogLevel::Warn,
                    "release",
                    "unknown_handle",
                    Some(handle),
                    None,
                    "fault",
                    "no_chunk_answers_to_handle",
                );
                return Err(HeapError::UnknownHandle { handle });
            }
        };
        let offset = handle - HEADER_SIZE;

        if header.is_free {
            HeapMetrics::inc(&metrics.double_releases);
            if policy.reports_fault() {
                self.record_lifecycle(
                    HeapLogLevel::Warn,
                    "release",
                    "double_release",
                    Some(handle),
                    Some(header.payload_size),
                    "fault",
                    "chunk_already_free",
                );
                return Err(HeapError::DoubleRelease { handle });
            }
            self.record_lifecycle(
                HeapLogLevel::Warn,
                "release",
                "double_release",
                Some(handle),
                Some(header.payload_size),
                "ignored",
                "chunk_already_free",
            );
            return Ok(());
        }

        self.directory.mark_free(offset);
        let (survivor, absorbed) = self.directory.coalesce(offset);
        if absorbed > 0 {
            HeapMetrics::add(&metrics.coalesces, absorbed as u64);
        }

        let mut details = format!("survivor={survivor:#x} absorbed={absorbed}");
        if self
            .directory
            .get(survivor)
            .is_some_and(|c| c.end_offset(survivor) == self.arena.high_water())
        {
            // Topmost chunk: give the whole span back to the break.
            if let Some((top_offset, top_header)) = self.directory.pop_top() {
                match self.arena.shrink(top_header.span()) {
                    Some(new_break) => {
                        HeapMetrics::inc(&metrics.shrinks);
                        details = format!(
                            "shrunk={} break={new_break:#x} absorbed={absorbed}",
                            top_header.span()
                        );
                    }
                    None => {
                        self.directory
                            .push_top(top_offset, top_header.payload_size, true);
                        self.record_lifecycle(
                            HeapLogLevel::Error,
                            "release",
                            "shrink_denied",
                            Some(handle),
                            Some(top_header.span()),
                            "recovered",
                            "break_refused_shrink",
                        );
                    }
                }
            }
        }

        HeapMetrics::inc(&metrics.releases);
        self.record_lifecycle(
            HeapLogLevel::Trace,
            "release",
            "release",
            Some(handle),
            Some(header.payload_size),
            "success",
            details,
        );
        Ok(())
    }

    /// Resolves a payload access to an arena offset, bounds-checked
    /// against the chunk's granted payload.
    fn payload_start(&self, handle: usize, offset: usize, len: usize) -> Result<usize, HeapError> {
        let header = match handle
            .checked_sub(HEADER_SIZE)
            .and_then(|chunk_offset| self.directory.get(chunk_offset))
        {
            Some(header) if !header.is_free => header,
            _ => return Err(HeapError::UnknownHandle { handle }),
        };
        let end = offset.checked_add(len).ok_or(HeapError::ArithmeticOverflow)?;
        if end > header.payload_size {
            return Err(HeapError::InvalidRequest);
        }
        Ok(handle + offset)
    }

    fn read(&self, handle: usize, offset: usize, len: usize) -> Result<Vec<u8>, HeapError> {
        let start = self.payload_start(handle, offset, len)?;
        Ok(self.arena.bytes(start, len).to_vec())
    }

    fn write(&mut self, handle: usize, offset: usize, data: &[u8]) -> Result<(), HeapError> {
        let start = self.payload_start(handle, offset, data.len())?;
        self.arena.bytes_mut(start, data.len()).copy_from_slice(data);
        Ok(())
    }
}

/// A single-arena first-fit heap.
///
/// Handles are payload offsets into the arena; callers read and write
/// their payload bytes through [`Heap::read`] and [`Heap::write`]. All
/// operations are linearizable behind one lock.
pub struct Heap<B: ProgramBreak = SimBreak> {
    state: Mutex<HeapState<B>>,
    metrics: HeapMetrics,
    config: HeapConfig,
}

impl Heap<SimBreak> {
    /// Heap over an unbounded simulated break.
    #[must_use]
    pub fn new() -> Self {
        Self::with_break(SimBreak::new())
    }

    /// Heap whose break refuses to grow past `ceiling` bytes.
    #[must_use]
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self::with_break(SimBreak::with_ceiling(ceiling))
    }
}

impl Default for Heap<SimBreak> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ProgramBreak> Heap<B> {
    /// Heap over a caller-supplied break primitive.
    pub fn with_break(brk: B) -> Self {
        Self::with_config(HeapConfig::default(), brk)
    }

    /// Heap with an explicit configuration.
    pub fn with_config(config: HeapConfig, brk: B) -> Self {
        Self {
            state: Mutex::new(HeapState {
                arena: Arena::new(brk),
                directory: ChunkDirectory::new(),
                next_decision_id: 1,
                lifecycle_logs: Vec::new(),
            }),
            metrics: HeapMetrics::new(),
            config,
        }
    }

    /// Allocates `size` payload bytes and returns the payload handle.
    pub fn allocate(&self, size: usize) -> Result<usize, HeapError> {
        self.state
            .lock()
            .allocate_chunk(size, &self.metrics)
            .map(|(handle, _)| handle)
    }

    /// Allocates a zero-filled payload for `count` elements of
    /// `element_size` bytes each, with checked multiplication.
    pub fn allocate_zeroed(&self, count: usize, element_size: usize) -> Result<usize, HeapError> {
        self.state
            .lock()
            .allocate_zeroed(count, element_size, &self.metrics)
    }

    /// Moves a payload to a chunk of `new_size` bytes.
    ///
    /// `None` behaves as a fresh allocation; `new_size == 0` releases the
    /// handle and returns `Ok(None)`. On success the first
    /// `min(old_payload, new_size)` bytes carry over and the old handle is
    /// released. On failure the old handle is untouched and still valid.
    pub fn resize(
        &self,
        handle: Option<usize>,
        new_size: usize,
    ) -> Result<Option<usize>, HeapError> {
        self.state
            .lock()
            .resize(handle, new_size, &self.metrics, self.config.double_release)
    }

    /// Gives a payload back, coalescing free neighbors and returning the
    /// topmost span to the break when possible.
    pub fn release(&self, handle: usize) -> Result<(), HeapError> {
        self.state
            .lock()
            .release(handle, &self.metrics, self.config.double_release)
    }

    /// Copies `len` payload bytes starting at `offset` within the handle.
    pub fn read(&self, handle: usize, offset: usize, len: usize) -> Result<Vec<u8>, HeapError> {
        self.state.lock().read(handle, offset, len)
    }

    /// Writes `data` at `offset` within the handle's payload.
    pub fn write(&self, handle: usize, offset: usize, data: &[u8]) -> Result<(), HeapError> {
        self.state.lock().write(handle, offset, data)
    }

    /// Payload bytes granted to `handle` (may exceed the requested size).
    pub fn payload_size(&self, handle: usize) -> Result<usize, HeapError> {
        let state = self.state.lock();
        match handle
            .checked_sub(HEADER_SIZE)
            .and_then(|offset| state.directory.get(offset))
        {
            Some(header) if !header.is_free => Ok(header.payload_size),
            _ => Err(HeapError::UnknownHandle { handle }),
        }
    }

    /// Walks the directory and reports every chunk. Diagnostic only.
    #[must_use]
    pub fn dump_state(&self) -> Vec<ChunkRecord> {
        self.state.lock().directory.records()
    }

    /// Full structural check of the directory against the arena.
    pub fn validate(&self) -> Result<(), String> {
        let state = self.state.lock();
        state.directory.validate(state.arena.high_water())
    }

    /// Operation counters for this heap.
    #[must_use]
    pub fn metrics(&self) -> &HeapMetrics {
        &self.metrics
    }

    /// The configuration this heap was built with.
    #[must_use]
    pub fn config(&self) -> HeapConfig {
        self.config
    }

    /// Current arena high-water mark.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.state.lock().arena.high_water()
    }

    /// Chunks currently linked in the directory.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.state.lock().directory.len()
    }

    /// Free payload bytes across the directory.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.state.lock().directory.free_bytes()
    }

    /// Returns a copy of the heap lifecycle log records.
    #[must_use]
    pub fn lifecycle_logs(&self) -> Vec<HeapLogRecord> {
        self.state.lock().lifecycle_logs.clone()
    }

    /// Drains heap lifecycle log records.
    pub fn drain_lifecycle_logs(&self) -> Vec<HeapLogRecord> {
        std::mem::take(&mut self.state.lock().lifecycle_logs)
    }
}
