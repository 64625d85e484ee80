//! Size arithmetic shared by the stores and the allocator: rounding to an
//! alignment and turning payload requests into block sizes.

use crate::block::{DSIZE, MIN_BLOCK_SIZE};

/// It aligns `to_be_aligned` using `aligment`, which must be a power of two.
///
/// This method is used to align reservation sizes to be a multiple of the page size
/// and block sizes to be a multiple of [`DSIZE`].
pub fn align(to_be_aligned: usize, aligment: usize) -> usize {
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}

/// Same as [`align`] but returns `None` instead of wrapping around.
pub fn checked_align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    Some(to_be_aligned.checked_add(aligment - 1)? & !(aligment - 1))
}

/// Turns a payload request of `size` bytes into a block size.
///
/// Every block carries a header and a footer word, so the overhead is one
/// double-word. Requests that fit in a double-word get the minimum block.
/// Returns `None` when the adjusted size does not fit in a `usize`.
pub fn adjust_request(size: usize) -> Option<usize> {
    if size <= DSIZE {
        return Some(MIN_BLOCK_SIZE);
    }

    checked_align(size.checked_add(DSIZE)?, DSIZE)
}
