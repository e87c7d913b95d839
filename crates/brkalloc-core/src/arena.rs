//! Byte-buffer mirror of the break-backed region.
//!
//! The arena owns the bytes between offset zero and the current break.
//! Chunk offsets index into this buffer; all payload access is
//! bounds-checked slicing, no raw pointers.

use crate::brk::ProgramBreak;

/// Contiguous memory region kept in lockstep with its break primitive.
///
/// Invariant: `bytes.len()` equals the break position at all times.
pub struct Arena<B: ProgramBreak> {
    bytes: Vec<u8>,
    brk: B,
}

impl<B: ProgramBreak> Arena<B> {
    /// Wraps a break primitive, mirroring whatever region it already spans.
    pub fn new(brk: B) -> Self {
        let bytes = vec![0u8; brk.current()];
        Self { bytes, brk }
    }

    /// Current high-water mark (end of the committed region).
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.bytes.len()
    }

    /// Extends the region by `delta` bytes.
    ///
    /// Returns the offset where the new span begins (the old break), or
    /// `None` when the break refuses to move. Fresh bytes read as zero.
    pub fn grow(&mut self, delta: usize) -> Option<usize> {
        let start = self.brk.current();
        let new_break = self.brk.extend(delta)?;
        self.bytes.resize(new_break, 0);
        Some(start)
    }

    /// Gives the top `delta` bytes back, lowering the high-water mark.
    pub fn shrink(&mut self, delta: usize) -> Option<usize> {
        let new_break = self.brk.shrink(delta)?;
        self.bytes.truncate(new_break);
        Some(new_break)
    }

    /// Read access to `len` bytes starting at `offset`.
    #[must_use]
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.bytes[offset..offset + len]
    }

    /// Write access to `len` bytes starting at `offset`.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.bytes[offset..offset + len]
    }

    /// Zero-fills `len` bytes starting at `offset`.
    pub fn zero(&mut self, offset: usize, len: usize) {
        self.bytes[offset..offset + len].fill(0);
    }

    /// Copies `len` bytes from `src` to `dst` inside the region.
    pub fn copy(&mut self, src: usize, dst: usize, len: usize) {
        self.bytes.copy_within(src..src + len, dst);
    }
}
