/*!
 * Allocator Errors
 * Failures reported by the backing store and by the heap checker
 */

use thiserror::Error;

/// Result of an operation that may need more memory from the backing store.
pub type AllocResult<T> = Result<T, AllocError>;

/// Errors that can be recovered from. The allocate family never returns
/// these directly, it reports "no allocation" instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("Backing store exhausted: requested {requested} bytes, {available} bytes available")]
    Exhausted { requested: usize, available: usize },

    #[error("Could not reserve {bytes} bytes of address space")]
    ReserveFailed { bytes: usize },

    #[error("Invalid allocator configuration: {0}")]
    InvalidConfig(String),
}

/// Heap invariant violations found by [`crate::Allocator::check_heap`].
///
/// Offsets are payload offsets into the arena, the same value a
/// [`crate::Handle`] carries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("Prologue block at 0x{offset:x} is corrupted")]
    BadPrologue { offset: usize },

    #[error("Epilogue at 0x{offset:x} is corrupted or not at the end of the arena")]
    BadEpilogue { offset: usize },

    #[error("Block at 0x{offset:x} with size {size} runs past the end of the arena")]
    OutOfBounds { offset: usize, size: usize },

    #[error("Block at 0x{offset:x} is misaligned (size {size})")]
    Misaligned { offset: usize, size: usize },

    #[error("Block at 0x{offset:x} has size {size}, below the minimum block size")]
    Undersized { offset: usize, size: usize },

    #[error("Block at 0x{offset:x}: header ({header_size}, {header_allocated}) does not match footer ({footer_size}, {footer_allocated})")]
    TagMismatch {
        offset: usize,
        header_size: usize,
        header_allocated: bool,
        footer_size: usize,
        footer_allocated: bool,
    },

    #[error("Free blocks at 0x{first:x} and 0x{second:x} are adjacent")]
    AdjacentFree { first: usize, second: usize },

    #[error("Blocks account for {accounted} bytes but the store granted {granted}")]
    Conservation { accounted: usize, granted: usize },

    #[error("Free block at 0x{offset:x} of size {size} is listed in class {class}, expected {expected}")]
    WrongClass {
        offset: usize,
        size: usize,
        class: usize,
        expected: usize,
    },

    #[error("Allocated block at 0x{offset:x} is listed in class {class}")]
    ListedAllocated { offset: usize, class: usize },

    #[error("Free block at 0x{offset:x} is listed more than once")]
    ListedTwice { offset: usize },

    #[error("Free block at 0x{offset:x} has a broken backward link")]
    BrokenBackLink { offset: usize },

    #[error("Frontier of class {class} does not point at the end of its chain")]
    StaleFrontier { class: usize },

    #[error("Free block at 0x{offset:x} is not reachable from any class")]
    Unlisted { offset: usize },
}
