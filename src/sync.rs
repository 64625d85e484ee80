/*!
 * Shared Allocator
 * One coarse lock around a whole allocator instance
 */

use std::fmt;

use parking_lot::{Mutex, MutexGuard};

use crate::{
    allocator::{Allocator, Handle},
    check::HeapStats,
    error::{AllocResult, HeapError},
    store::BackingStore,
};

/// An [`Allocator`] usable from several threads.
///
/// The engine itself assumes exclusive access, so every operation takes the
/// same lock for its whole duration. Payload bytes are reached through
/// [`SharedAllocator::with_payload`], which keeps the lock held while the
/// closure runs.
pub struct SharedAllocator<S> {
    inner: Mutex<Allocator<S>>,
}

impl<S: BackingStore> SharedAllocator<S> {
    pub fn new(allocator: Allocator<S>) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    pub fn init(&self) -> AllocResult<()> {
        self.inner.lock().init()
    }

    pub fn allocate(&self, size: usize) -> Option<Handle> {
        self.inner.lock().allocate(size)
    }

    pub fn release(&self, handle: Option<Handle>) {
        self.inner.lock().release(handle)
    }

    pub fn resize(&self, handle: Option<Handle>, size: usize) -> Option<Handle> {
        self.inner.lock().resize(handle, size)
    }

    pub fn zero_allocate(&self, count: usize, elem_size: usize) -> Option<Handle> {
        self.inner.lock().zero_allocate(count, elem_size)
    }

    pub fn check_heap(&self) -> Result<HeapStats, HeapError> {
        self.inner.lock().check_heap()
    }

    pub fn checkheap(&self, context: impl fmt::Display) {
        self.inner.lock().checkheap(context)
    }

    /// Runs `f` over the payload of `handle` with the lock held.
    pub fn with_payload<R>(&self, handle: Handle, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut allocator = self.inner.lock();
        f(allocator.payload_mut(handle))
    }

    /// Locks the allocator for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, Allocator<S>> {
        self.inner.lock()
    }

    pub fn into_inner(self) -> Allocator<S> {
        self.inner.into_inner()
    }
}

impl<S: BackingStore> From<Allocator<S>> for SharedAllocator<S> {
    fn from(allocator: Allocator<S>) -> Self {
        Self::new(allocator)
    }
}

impl<S> fmt::Debug for SharedAllocator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedAllocator").finish_non_exhaustive()
    }
}
