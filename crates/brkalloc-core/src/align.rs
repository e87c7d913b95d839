//! Word-alignment helpers shared by the directory and the facade.

/// Payload and break-request alignment in bytes (one 64-bit word).
pub const ALIGNMENT: usize = 8;

/// Rounds `size` up to the next multiple of [`ALIGNMENT`].
///
/// Returns `None` when the padded value does not fit in `usize`.
#[must_use]
pub const fn align_up(size: usize) -> Option<usize> {
    match size.checked_add(ALIGNMENT - 1) {
        Some(padded) => Some(padded & !(ALIGNMENT - 1)),
        None => None,
    }
}

/// Returns true if `value` sits on an [`ALIGNMENT`] boundary.
#[must_use]
pub const fn is_aligned(value: usize) -> bool {
    value % ALIGNMENT == 0
}
