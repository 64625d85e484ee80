/*!
 * Arena
 * Raw word access over the bytes granted by a backing store
 */

use crate::{
    block::DSIZE,
    error::{AllocError, AllocResult},
    store::BackingStore,
};

/// Boundary tags are 32 bit words, so no block (and no arena) can be larger
/// than the biggest double-word multiple that fits in one.
pub(crate) const MAX_ARENA_SIZE: usize = u32::MAX as usize & !(DSIZE - 1);

/// The address space the allocator manages.
///
/// Everything is addressed by offsets into [`BackingStore::bytes`], never by
/// raw pointers. Words are 4 byte boundary tags, links are 8 byte offsets.
#[derive(Debug)]
pub(crate) struct Arena<S> {
    store: S,
}

impl<S: BackingStore> Arena<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Bytes granted by the store so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Appends `delta` zeroed bytes and returns the offset where they begin.
    pub fn grow(&mut self, delta: usize) -> AllocResult<usize> {
        let available = MAX_ARENA_SIZE.saturating_sub(self.len());

        if delta > available {
            return Err(AllocError::Exhausted {
                requested: delta,
                available,
            });
        }

        let start = self.store.grow(delta)?;

        tracing::debug!(start, delta, len = self.len(), "arena grown");

        Ok(start)
    }

    #[inline]
    pub fn word(&self, at: usize) -> u32 {
        let mut word = [0; 4];
        word.copy_from_slice(&self.store.bytes()[at..at + 4]);
        u32::from_ne_bytes(word)
    }

    #[inline]
    pub fn set_word(&mut self, at: usize, value: u32) {
        self.store.bytes_mut()[at..at + 4].copy_from_slice(&value.to_ne_bytes());
    }

    #[inline]
    pub fn link(&self, at: usize) -> usize {
        let mut link = [0; 8];
        link.copy_from_slice(&self.store.bytes()[at..at + 8]);
        u64::from_ne_bytes(link) as usize
    }

    #[inline]
    pub fn set_link(&mut self, at: usize, value: usize) {
        self.store.bytes_mut()[at..at + 8].copy_from_slice(&(value as u64).to_ne_bytes());
    }

    #[inline]
    pub fn bytes(&self, at: usize, len: usize) -> &[u8] {
        &self.store.bytes()[at..at + len]
    }

    #[inline]
    pub fn bytes_mut(&mut self, at: usize, len: usize) -> &mut [u8] {
        &mut self.store.bytes_mut()[at..at + len]
    }

    /// Copies `len` bytes from `from` to `to`. The ranges may overlap.
    pub fn copy(&mut self, from: usize, to: usize, len: usize) {
        self.store.bytes_mut().copy_within(from..from + len, to);
    }
}
