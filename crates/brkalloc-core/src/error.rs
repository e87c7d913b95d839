//! Error taxonomy for the public heap operations.

use thiserror::Error;

/// Failure returned by the allocator facade.
///
/// Every variant is recoverable: the directory and all handles the caller
/// already holds stay valid after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    /// Zero-sized allocate/zeroed-allocate argument, or a payload access
    /// outside the chunk's granted bytes.
    #[error("request is empty or outside the granted payload")]
    InvalidRequest,
    /// Size arithmetic left the address range.
    #[error("request size overflows the address range")]
    ArithmeticOverflow,
    /// The break primitive refused to grow the arena.
    #[error("arena growth denied by the break primitive")]
    ResourceExhausted,
    /// The handle's chunk is already free.
    #[error("handle {handle:#x} was already released")]
    DoubleRelease {
        /// Payload offset passed by the caller.
        handle: usize,
    },
    /// The handle does not name an allocated payload.
    #[error("handle {handle:#x} does not name an allocated payload")]
    UnknownHandle {
        /// Payload offset passed by the caller.
        handle: usize,
    },
}
