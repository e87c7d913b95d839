//! Chunk headers and the doubly linked chunk directory.
//!
//! The directory threads every chunk currently carved out of the arena,
//! free or in-use, in ascending offset order. Links double as adjacency:
//! a chunk's `next` always starts exactly where the chunk ends, so the
//! directory tiles the arena from offset zero to the high-water mark
//! with no gaps and no overlap. Split and coalesce preserve the tiling.

use std::collections::HashMap;

use serde::Serialize;

use crate::align::{ALIGNMENT, is_aligned};

/// Bytes reserved in front of every payload for its header.
///
/// Matches a four-word header: payload size, free flag, two links.
pub const HEADER_SIZE: usize = 32;

/// Metadata for one chunk of arena memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Usable bytes following the header, always a multiple of [`ALIGNMENT`].
    pub payload_size: usize,
    /// True iff the chunk is not currently handed to a caller.
    pub is_free: bool,
    /// Offset of the memory-adjacent higher chunk, `None` for the topmost.
    pub next: Option<usize>,
    /// Offset of the memory-adjacent lower chunk, `None` for the bottom.
    pub prev: Option<usize>,
}

impl ChunkHeader {
    /// Header plus payload, the full footprint of the chunk.
    #[must_use]
    pub fn span(&self) -> usize {
        HEADER_SIZE + self.payload_size
    }

    /// First offset past the chunk, given its own offset.
    #[must_use]
    pub fn end_offset(&self, offset: usize) -> usize {
        offset + self.span()
    }
}

/// One row of a directory dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    /// Header offset of the chunk.
    pub address: usize,
    /// Payload size in bytes.
    pub size: usize,
    /// Free flag.
    pub free: bool,
    /// Header offset of the next chunk, if any.
    pub next_address: Option<usize>,
    /// Header offset of the previous chunk, if any.
    pub prev_address: Option<usize>,
}

/// Doubly linked list of chunk headers, keyed by header offset.
///
/// `head` is the lowest offset (always zero when non-empty), `tail` the
/// topmost chunk abutting the high-water mark.
#[derive(Debug, Default)]
pub struct ChunkDirectory {
    chunks: HashMap<usize, ChunkHeader>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl ChunkDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks currently linked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when no chunks are linked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Offset of the lowest chunk, if any.
    #[must_use]
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Offset of the topmost chunk, if any.
    #[must_use]
    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    /// Header of the chunk at `offset`.
    #[must_use]
    pub fn get(&self, offset: usize) -> Option<ChunkHeader> {
        self.chunks.get(&offset).copied()
    }

    /// Sum of all free payload bytes.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.chunks
            .values()
            .filter(|c| c.is_free)
            .map(|c| c.payload_size)
            .sum()
    }

    /// First-fit scan from the head.
    ///
    /// Returns the offset of the first free chunk whose payload holds
    /// `payload_size` bytes, or `None` when the facade must grow the arena.
    #[must_use]
    pub fn first_fit(&self, payload_size: usize) -> Option<usize> {
        let mut cursor = self.head;
        while let Some(offset) = cursor {
            let header = self.chunks.get(&offset)?;
            if header.is_free && header.payload_size >= payload_size {
                return Some(offset);
            }
            cursor = header.next;
        }
        None
    }

    /// Links a new chunk at the topmost position.
    ///
    /// The caller guarantees `offset` is the old high-water mark, which
    /// keeps the links in memory order.
    pub fn push_top(&mut self, offset: usize, payload_size: usize, is_free: bool) {
        let header = ChunkHeader {
            payload_size,
            is_free,
            next: None,
            prev: self.tail,
        };
        match self.tail {
            Some(tail_offset) => {
                if let Some(tail) = self.chunks.get_mut(&tail_offset) {
                    tail.next = Some(offset);
                }
            }
            None => self.head = Some(offset),
        }
        self.tail = Some(offset);
        self.chunks.insert(offset, header);
    }

    /// Unlinks and returns the topmost chunk.
    pub fn pop_top(&mut self) -> Option<(usize, ChunkHeader)> {
        let offset = self.tail?;
        let header = self.chunks.remove(&offset)?;
        match header.prev {
            Some(prev_offset) => {
                if let Some(prev) = self.chunks.get_mut(&prev_offset) {
                    prev.next = None;
                }
                self.tail = Some(prev_offset);
            }
            None => {
                self.head = None;
                self.tail = None;
            }
        }
        Some((offset, header))
    }

    /// Marks the chunk at `offset` as handed out.
    pub fn mark_in_use(&mut self, offset: usize) -> bool {
        match self.chunks.get_mut(&offset) {
            Some(header) => {
                header.is_free = false;
                true
            }
            None => false,
        }
    }

    /// Marks the chunk at `offset` as free.
    pub fn mark_free(&mut self, offset: usize) -> bool {
        match self.chunks.get_mut(&offset) {
            Some(header) => {
                header.is_free = true;
                true
            }
            None => false,
        }
    }

    /// Carves the free chunk at `offset` down to `target` payload bytes.
    ///
    /// The remainder becomes a new free chunk linked directly after. No
    /// split happens when the slack cannot hold another header plus at
    /// least one aligned payload word; the whole chunk is handed out
    /// unmodified in that case. `target` must be aligned and no larger
    /// than the chunk's payload.
    pub fn split(&mut self, offset: usize, target: usize) -> bool {
        let Some(header) = self.chunks.get(&offset).copied() else {
            return false;
        };
        if !header.is_free || header.payload_size <= target + HEADER_SIZE {
            return false;
        }

        let remainder_offset = offset + HEADER_SIZE + target;
        let remainder = ChunkHeader {
            payload_size: header.payload_size - target - HEADER_SIZE,
            is_free: true,
            next: header.next,
            prev: Some(offset),
        };
        match header.next {
            Some(next_offset) => {
                if let Some(next) = self.chunks.get_mut(&next_offset) {
                    next.prev = Some(remainder_offset);
                }
            }
            None => self.tail = Some(remainder_offset),
        }
        if let Some(current) = self.chunks.get_mut(&offset) {
            current.payload_size = target;
            current.next = Some(remainder_offset);
        }
        self.chunks.insert(remainder_offset, remainder);
        true
    }

    /// Merges the free chunk at `offset` with its free memory neighbors.
    ///
    /// Returns the offset of the surviving chunk and how many neighbors
    /// were absorbed. The chunk itself must already be marked free.
    pub fn coalesce(&mut self, offset: usize) -> (usize, usize) {
        if !self.chunks.get(&offset).is_some_and(|c| c.is_free) {
            return (offset, 0);
        }

        let mut absorbed = 0usize;
        if let Some(next_offset) = self.chunks.get(&offset).and_then(|c| c.next)
            && self.chunks.get(&next_offset).is_some_and(|c| c.is_free)
            && self.absorb_next(offset)
        {
            absorbed += 1;
        }

        let mut survivor = offset;
        if let Some(prev_offset) = self.chunks.get(&offset).and_then(|c| c.prev)
            && self.chunks.get(&prev_offset).is_some_and(|c| c.is_free)
            && self.absorb_next(prev_offset)
        {
            survivor = prev_offset;
            absorbed += 1;
        }
        (survivor, absorbed)
    }

    /// Folds the chunk after `offset` into the chunk at `offset`.
    fn absorb_next(&mut self, offset: usize) -> bool {
        let Some(header) = self.chunks.get(&offset).copied() else {
            return false;
        };
        let Some(next_offset) = header.next else {
            return false;
        };
        let Some(next_header) = self.chunks.remove(&next_offset) else {
            return false;
        };

        match next_header.next {
            Some(after_offset) => {
                if let Some(after) = self.chunks.get_mut(&after_offset) {
                    after.prev = Some(offset);
                }
            }
            None => self.tail = Some(offset),
        }
        if let Some(current) = self.chunks.get_mut(&offset) {
            current.payload_size += HEADER_SIZE + next_header.payload_size;
            current.next = next_header.next;
        }
        true
    }

    /// Dump of every chunk in link order.
    #[must_use]
    pub fn records(&self) -> Vec<ChunkRecord> {
        let mut out = Vec::with_capacity(self.chunks.len());
        let mut cursor = self.head;
        while let Some(offset) = cursor {
            let Some(header) = self.chunks.get(&offset) else {
                break;
            };
            out.push(ChunkRecord {
                address: offset,
                size: header.payload_size,
                free: header.is_free,
                next_address: header.next,
                prev_address: header.prev,
            });
            cursor = header.next;
        }
        out
    }

    /// Full structural check against the arena's high-water mark.
    ///
    /// Verifies the tiling (chunks cover `[0, high_water)` back to back,
    /// so no overlap is possible), link reciprocity, payload alignment,
    /// and that no two adjacent chunks are both free.
    pub fn validate(&self, high_water: usize) -> Result<(), String> {
        let Some(head) = self.head else {
            if !self.chunks.is_empty() {
                return Err(format!(
                    "headless directory still holds {} chunk(s)",
                    self.chunks.len()
                ));
            }
            if self.tail.is_some() {
                return Err("tail link set on an empty directory".to_string());
            }
            if high_water != 0 {
                return Err(format!(
                    "empty directory but high-water mark at {high_water:#x}"
                ));
            }
            return Ok(());
        };

        if head != 0 {
            return Err(format!("head chunk at {head:#x}, expected offset 0"));
        }

        let mut cursor = Some(head);
        let mut expected_offset = 0usize;
        let mut expected_prev = None;
        let mut visited = 0usize;
        let mut previous_free = false;
        let mut last_offset = head;

        while let Some(offset) = cursor {
            let Some(header) = self.chunks.get(&offset) else {
                return Err(format!("link points at {offset:#x} with no entry"));
            };
            if offset != expected_offset {
                return Err(format!(
                    "chunk at {offset:#x} should start at {expected_offset:#x}"
                ));
            }
            if header.prev != expected_prev {
                return Err(format!(
                    "chunk at {offset:#x} has prev {:?}, expected {:?}",
                    header.prev, expected_prev
                ));
            }
            if header.payload_size < ALIGNMENT || !is_aligned(header.payload_size) {
                return Err(format!(
                    "chunk at {offset:#x} has bad payload size {}",
                    header.payload_size
                ));
            }
            if header.is_free && previous_free {
                return Err(format!(
                    "adjacent free chunks ending at {offset:#x} were not coalesced"
                ));
            }

            visited += 1;
            if visited > self.chunks.len() {
                return Err("directory links form a cycle".to_string());
            }
            previous_free = header.is_free;
            expected_prev = Some(offset);
            expected_offset = header.end_offset(offset);
            last_offset = offset;
            cursor = header.next;
        }

        if visited != self.chunks.len() {
            return Err(format!(
                "{} chunk(s) are not reachable from the head",
                self.chunks.len() - visited
            ));
        }
        if self.tail != Some(last_offset) {
            return Err(format!(
                "tail link is {:?}, expected {last_offset:#x}",
                self.tail
            ));
        }
        if expected_offset != high_water {
            return Err(format!(
                "last chunk ends at {expected_offset:#x}, high-water mark at {high_water:#x}"
            ));
        }
        Ok(())
    }
}
