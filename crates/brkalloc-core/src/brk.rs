//! Program-break primitive behind the arena.
//!
//! The break is the upper boundary of the OS-backed region. The facade
//! aligns every delta before asking for it, and all calls are serialized
//! by the heap lock; implementations do not need to be thread-safe.

/// Moves the end of the backing region up and down, `sbrk`-style.
pub trait ProgramBreak {
    /// Moves the break up by `delta` bytes.
    ///
    /// Returns the new break position, or `None` when the region cannot
    /// grow (resource exhaustion).
    fn extend(&mut self, delta: usize) -> Option<usize>;

    /// Moves the break down by `delta` bytes.
    ///
    /// Returns the new break position, or `None` when `delta` exceeds the
    /// current break.
    fn shrink(&mut self, delta: usize) -> Option<usize>;

    /// Current break position.
    fn current(&self) -> usize;
}

/// In-process break simulation backing the default heap.
///
/// An optional ceiling caps the break so exhaustion paths can be driven
/// deterministically in tests and harness runs.
#[derive(Debug, Clone)]
pub struct SimBreak {
    position: usize,
    ceiling: Option<usize>,
}

impl SimBreak {
    /// Unbounded break starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: 0,
            ceiling: None,
        }
    }

    /// Break that refuses to grow past `ceiling` bytes.
    #[must_use]
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            position: 0,
            ceiling: Some(ceiling),
        }
    }
}

impl Default for SimBreak {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBreak for SimBreak {
    fn extend(&mut self, delta: usize) -> Option<usize> {
        let next = self.position.checked_add(delta)?;
        if let Some(limit) = self.ceiling
            && next > limit
        {
            return None;
        }
        self.position = next;
        Some(next)
    }

    fn shrink(&mut self, delta: usize) -> Option<usize> {
        let next = self.position.checked_sub(delta)?;
        self.position = next;
        Some(next)
    }

    fn current(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_accumulates() {
        let mut brk = SimBreak::new();
        assert_eq!(brk.extend(64), Some(64));
        assert_eq!(brk.extend(32), Some(96));
        assert_eq!(brk.current(), 96);
    }

    #[test]
    fn shrink_reverses_extend() {
        let mut brk = SimBreak::new();
        brk.extend(128);
        assert_eq!(brk.shrink(48), Some(80));
        assert_eq!(brk.current(), 80);
    }

    #[test]
    fn shrink_below_zero_is_refused() {
        let mut brk = SimBreak::new();
        brk.extend(16);
        assert_eq!(brk.shrink(32), None);
        assert_eq!(brk.current(), 16);
    }

    #[test]
    fn ceiling_denies_growth() {
        let mut brk = SimBreak::with_ceiling(100);
        assert_eq!(brk.extend(96), Some(96));
        assert_eq!(brk.extend(8), None);
        assert_eq!(brk.current(), 96);
        assert_eq!(brk.extend(4), Some(100));
    }

    #[test]
    fn extend_overflow_is_refused() {
        let mut brk = SimBreak::new();
        brk.extend(8);
        assert_eq!(brk.extend(usize::MAX), None);
        assert_eq!(brk.current(), 8);
    }
}
