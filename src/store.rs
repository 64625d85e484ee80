/*!
 * Backing Stores
 * The only-grows address space the allocator carves blocks from
 */

use std::{fmt, ptr::NonNull, slice};

use crate::{
    error::{AllocError, AllocResult},
    kernel::{self, page_size},
    utils::checked_align,
};

/// Source of the arena's address space.
///
/// A store behaves like `sbrk`: every call to [`BackingStore::grow`] appends
/// `delta` zeroed bytes right after the previous end and returns the offset of
/// the appended region. Previously granted bytes are never moved, shrunk or
/// reclaimed. A store that cannot satisfy a request must fail without granting
/// anything.
pub trait BackingStore {
    /// Extends the store by `delta` bytes and returns the offset where the new
    /// bytes begin (always the previous [`BackingStore::len`]).
    fn grow(&mut self, delta: usize) -> AllocResult<usize>;

    /// Total bytes granted so far.
    fn len(&self) -> usize;

    /// Tells whether nothing has been granted yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every byte granted so far.
    fn bytes(&self) -> &[u8];

    /// Every byte granted so far, mutably.
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// Store backed by a heap `Vec<u8>`, optionally capped at `limit` bytes.
///
/// The vector may reallocate when it grows. That's fine for the allocator
/// since it only ever addresses the arena through offsets.
#[derive(Debug, Default, Clone)]
pub struct VecStore {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl VecStore {
    /// Creates an empty store without a ceiling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that refuses to grow past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: Some(limit),
        }
    }

    /// Ceiling configured with [`VecStore::with_limit`].
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl BackingStore for VecStore {
    fn grow(&mut self, delta: usize) -> AllocResult<usize> {
        let start = self.bytes.len();
        let available = match self.limit {
            Some(limit) => limit.saturating_sub(start),
            None => usize::MAX - start,
        };

        if delta > available {
            return Err(AllocError::Exhausted {
                requested: delta,
                available,
            });
        }

        self.bytes.resize(start + delta, 0);

        Ok(start)
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Store backed by one range of virtual memory reserved from the operating
/// system up front, the same way a `memlib`-style simulated `sbrk` works.
///
/// The whole range is requested once on construction, pages are zero-filled
/// by the kernel, and [`BackingStore::grow`] just moves the break forward
/// inside the range. The range goes back to the kernel on drop.
pub struct SystemStore {
    /// Start of the reserved range.
    base: NonNull<u8>,
    /// Current break, relative to `base`.
    len: usize,
    /// Size of the reserved range.
    capacity: usize,
}

// SAFETY: the reserved range is owned exclusively by this value and is only
// reachable through `&self` / `&mut self`.
unsafe impl Send for SystemStore {}

impl SystemStore {
    /// Reservation used by [`SystemStore::new`]: 20 MiB.
    pub const DEFAULT_CAPACITY: usize = 20 * (1 << 20);

    /// Reserves [`SystemStore::DEFAULT_CAPACITY`] bytes.
    pub fn new() -> AllocResult<Self> {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Reserves `capacity` bytes, rounded up to a multiple of the page size.
    pub fn with_capacity(capacity: usize) -> AllocResult<Self> {
        let capacity = checked_align(capacity.max(1), page_size())
            .ok_or(AllocError::ReserveFailed { bytes: capacity })?;

        // SAFETY: `capacity` is a non-zero multiple of the page size.
        let base = unsafe { kernel::reserve(capacity) }
            .ok_or(AllocError::ReserveFailed { bytes: capacity })?;

        tracing::debug!(capacity, "reserved system backing store");

        Ok(Self {
            base,
            len: 0,
            capacity,
        })
    }

    /// Size of the reserved range.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for SystemStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemStore")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl BackingStore for SystemStore {
    fn grow(&mut self, delta: usize) -> AllocResult<usize> {
        let available = self.capacity - self.len;

        if delta > available {
            return Err(AllocError::Exhausted {
                requested: delta,
                available,
            });
        }

        let start = self.len;
        self.len += delta;

        Ok(start)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `base..base + len` lies inside the reserved range, which stays
        // mapped for the lifetime of `self`.
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: see `bytes`; `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }
}

impl Drop for SystemStore {
    fn drop(&mut self) {
        // SAFETY: the range came from `kernel::reserve` and dies with `self`.
        unsafe { kernel::unreserve(self.base, self.capacity) }
    }
}
