//! Helper functions that don't belong to any concrete module of the pool.

/// Size of a CPU cache line in bytes. Slots and the pool's shared state are
/// aligned to this so that two threads never write to the same line.
pub const CACHE_LINE: usize = 64;

/// It aligns `to_be_aligned` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Used to round slot sizes up to
/// [`CACHE_LINE`] and region sizes up to the page size.
#[inline]
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`] but returns `None` instead of wrapping around.
#[inline]
pub fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    Some(to_be_aligned.checked_add(alignment - 1)? & !(alignment - 1))
}
