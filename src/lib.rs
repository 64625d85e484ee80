//! Segregated free-list allocator over a single, only-grows arena.
//!
//! The arena is obtained from a [`BackingStore`], which behaves like `sbrk`:
//! it appends zeroed bytes and never moves or reclaims them. The allocator
//! carves it into blocks with a boundary tag at each end:
//!
//! ```text
//! +-----+-----------------+--------+--------+--------+- ... -+----------+
//! | pad |    prologue     | block  | block  | block  |       | epilogue |
//! |     | (11 sentinels)  | alloc  |  free  | alloc  |       |  (0, a)  |
//! +-----+-----------------+--------+--------+--------+- ... -+----------+
//! ```
//!
//! Free blocks are kept in eleven size classes (upper bounds 16, 32, ...,
//! 8192 bytes and unbounded), linked through their own payload. Requests in
//! the two smallest classes take the first block that fits, bigger requests
//! take the tightest block of the first class that has one. Freed blocks are
//! merged with free neighbours immediately.
//!
//! ```rust
//! use segalloc::{Allocator, VecStore};
//!
//! let mut allocator = Allocator::new(VecStore::new());
//!
//! let handle = allocator.allocate(20).unwrap();
//! allocator.payload_mut(handle)[..5].copy_from_slice(b"hello");
//!
//! let handle = allocator.resize(Some(handle), 400).unwrap();
//! assert_eq!(&allocator.payload(handle)[..5], b"hello");
//!
//! allocator.release(Some(handle));
//! allocator.checkheap("after release");
//! ```
//!
//! The engine is single threaded: operations take `&mut self` and no lock is
//! ever taken internally. [`SharedAllocator`] puts a whole instance behind one
//! mutex when it has to be shared.

mod allocator;
mod arena;
mod block;
mod check;
mod coalesce;
pub mod config;
pub mod error;
mod fit;
pub mod freelist;
mod kernel;
pub mod store;
mod sync;
pub mod utils;

pub use allocator::{Allocator, BOOTSTRAP_SIZE, Handle};
pub use check::{BlockInfo, HeapStats, HeapWalk};
pub use config::{AllocatorConfig, DEFAULT_CHUNK_SIZE};
pub use error::{AllocError, AllocResult, HeapError};
pub use store::{BackingStore, SystemStore, VecStore};
pub use sync::SharedAllocator;
