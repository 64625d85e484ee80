use tracing::{debug, trace, warn};

use crate::{
    arena::Arena,
    block::{Block, DSIZE, FreeBlock, MIN_BLOCK_SIZE, Tag, WSIZE},
    config::AllocatorConfig,
    error::AllocResult,
    freelist::{CLASS_COUNT, FreeListIndex},
    store::{BackingStore, VecStore},
    utils::{adjust_request, align},
};

/// The prologue is an allocated block whose payload holds one sentinel slot
/// per size class.
pub(crate) const PROLOGUE_SIZE: usize = DSIZE * (CLASS_COUNT + 1);

/// Alignment padding + prologue + epilogue header.
pub const BOOTSTRAP_SIZE: usize = WSIZE + PROLOGUE_SIZE + WSIZE;

/// Opaque reference to an allocated block, the offset of its payload inside
/// the arena. `None` plays the role of a null pointer everywhere in the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(usize);

impl Handle {
    /// Offset of the payload inside the backing store's bytes.
    pub fn offset(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) fn block(self) -> Block {
        Block::at(self.0)
    }
}

impl From<Block> for Handle {
    fn from(block: Block) -> Self {
        Self(block.offset())
    }
}

/// Segregated free-list allocator over a single, only-grows arena.
///
/// ```text
///  origin
///  v
/// +-----+----------------------------+-------+-------+- ... -+----------+
/// | pad | prologue (11 sentinels)    | block | block |       | epilogue |
/// +-----+----------------------------+-------+-------+- ... -+----------+
///   4              96                                             4
/// ```
///
/// Every block carries a boundary tag at both ends, free blocks are kept in
/// one of eleven size classes and are coalesced with their free neighbours
/// as soon as they appear. When nothing fits, the arena grows by at least
/// [`AllocatorConfig::chunk_size`] bytes.
///
/// The allocator does no locking of its own: every operation takes
/// `&mut self`. See [`crate::SharedAllocator`] for use from several threads.
#[derive(Debug)]
pub struct Allocator<S = VecStore> {
    pub(crate) arena: Arena<S>,
    pub(crate) index: FreeListIndex,
    /// Offset of the bootstrap region, `None` until [`Allocator::init`] runs.
    pub(crate) origin: Option<usize>,
    config: AllocatorConfig,
}

impl Default for Allocator<VecStore> {
    fn default() -> Self {
        Self::new(VecStore::new())
    }
}

impl<S: BackingStore> Allocator<S> {
    /// Creates an allocator with the default configuration. Nothing is
    /// requested from `store` until the first operation.
    pub fn new(store: S) -> Self {
        Self {
            arena: Arena::new(store),
            index: FreeListIndex::new(DSIZE),
            origin: None,
            config: AllocatorConfig::default(),
        }
    }

    pub fn with_config(store: S, config: AllocatorConfig) -> AllocResult<Self> {
        config.validate()?;

        let mut allocator = Self::new(store);
        allocator.config = config;

        Ok(allocator)
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        self.arena.store()
    }

    pub fn into_store(self) -> S {
        self.arena.into_store()
    }

    pub fn is_initialized(&self) -> bool {
        self.origin.is_some()
    }

    /// Total bytes granted by the backing store.
    pub fn heap_size(&self) -> usize {
        self.arena.len()
    }

    /// Lays out the bootstrap region and seeds the first free block.
    ///
    /// Calling it again once it succeeded is a no-op. Every other operation
    /// calls it on demand, so calling it explicitly is only needed to surface
    /// the error.
    pub fn init(&mut self) -> AllocResult<()> {
        if self.origin.is_some() {
            return Ok(());
        }

        // Keep every block double-word aligned even on a store that was
        // already partly used.
        let len = self.arena.len();
        let padding = align(len, DSIZE) - len;
        let origin = self.arena.grow(padding + BOOTSTRAP_SIZE)? + padding;

        let prologue = Block::at(origin + DSIZE);
        self.arena.set_word(origin, 0);
        self.arena.write_tags(prologue, Tag::allocated(PROLOGUE_SIZE));
        self.arena.write_epilogue(origin + WSIZE + PROLOGUE_SIZE);

        self.index = FreeListIndex::new(prologue.offset());
        self.index.reset(&mut self.arena);
        self.origin = Some(origin);

        debug!(origin, chunk_size = self.config.chunk_size, "allocator initialised");

        self.extend_heap(self.config.chunk_size)?;

        Ok(())
    }

    /// Allocates a block with room for at least `size` bytes.
    ///
    /// Returns `None` for `size == 0` and when the backing store refuses to
    /// grow.
    pub fn allocate(&mut self, size: usize) -> Option<Handle> {
        if let Err(err) = self.init() {
            warn!(size, %err, "allocator could not be initialised");
            return None;
        }

        if size == 0 {
            return None;
        }

        let asize = adjust_request(size)?;

        match self.allocate_block(asize) {
            Ok(block) => Some(Handle::from(block)),
            Err(err) => {
                warn!(size, asize, %err, "allocation failed");
                None
            }
        }
    }

    /// Releases a block. `None` is ignored.
    pub fn release(&mut self, handle: Option<Handle>) {
        let Some(handle) = handle else {
            return;
        };

        let block = handle.block();
        debug_assert!(
            self.arena.header(block).allocated,
            "{handle:?} released while not allocated"
        );

        let size = self.arena.size_of(block);
        self.free_block(block, size);
    }

    /// Changes the size of an allocation, preserving its contents up to the
    /// smaller of the old and new sizes.
    ///
    /// - `resize(None, n)` is `allocate(n)`.
    /// - `resize(h, 0)` releases `h` and returns `None`.
    /// - The block is shrunk or grown in place when it is already large
    ///   enough, or when absorbing the next block (if free) makes it so.
    /// - Otherwise the contents move to a new block and `h` is released.
    ///
    /// On failure `None` is returned and `h` is left untouched and valid.
    pub fn resize(&mut self, handle: Option<Handle>, size: usize) -> Option<Handle> {
        let Some(handle) = handle else {
            return self.allocate(size);
        };

        if size == 0 {
            self.release(Some(handle));
            return None;
        }

        let asize = adjust_request(size)?;
        let block = handle.block();
        let old = self.arena.size_of(block);

        if old >= asize {
            if old - asize >= MIN_BLOCK_SIZE {
                // Big enough to give the tail back.
                self.arena.write_tags(block, Tag::allocated(asize));
                let rest = self.arena.next_block(block);
                self.free_block(rest, old - asize);
            }
            return Some(handle);
        }

        let next = self.arena.next_block(block);
        if let Some(next) = self.arena.as_free(next) {
            let total = old + self.arena.size_of(next.block());

            if total >= asize {
                self.index.remove(&mut self.arena, &next);

                if total - asize >= MIN_BLOCK_SIZE {
                    self.arena.write_tags(block, Tag::allocated(asize));
                    let rest = self.arena.next_block(block);
                    self.free_block(rest, total - asize);
                } else {
                    self.arena.write_tags(block, Tag::allocated(total));
                }

                return Some(handle);
            }
        }

        let moved = self.allocate(size)?;
        let len = (old - DSIZE).min(self.capacity(moved));
        self.arena.copy(block.offset(), moved.offset(), len);
        self.release(Some(handle));

        trace!(from = handle.offset(), to = moved.offset(), len, "allocation relocated");

        Some(moved)
    }

    /// Allocates room for `count` elements of `elem_size` bytes and zeroes it.
    ///
    /// Returns `None` when `count * elem_size` overflows, is zero, or cannot
    /// be allocated.
    pub fn zero_allocate(&mut self, count: usize, elem_size: usize) -> Option<Handle> {
        let Some(bytes) = count.checked_mul(elem_size) else {
            warn!(count, elem_size, "zero_allocate request overflows");
            return None;
        };

        let handle = self.allocate(bytes)?;
        self.payload_mut(handle)[..bytes].fill(0);

        Some(handle)
    }

    /// Usable bytes of an allocation. At least what was requested.
    pub fn capacity(&self, handle: Handle) -> usize {
        self.arena.size_of(handle.block()) - DSIZE
    }

    pub fn payload(&self, handle: Handle) -> &[u8] {
        self.arena.payload(handle.block())
    }

    pub fn payload_mut(&mut self, handle: Handle) -> &mut [u8] {
        self.arena.payload_mut(handle.block())
    }

    fn allocate_block(&mut self, asize: usize) -> AllocResult<Block> {
        let block = match self.index.find_fit(&self.arena, asize) {
            Some(block) => block,
            None => self.extend_heap(asize.max(self.config.chunk_size))?,
        };

        Ok(self.index.place(&mut self.arena, block, asize))
    }

    /// Grows the arena by `bytes` (rounded to a double-word) and returns the
    /// resulting free block, merged with a free block that ended the arena.
    fn extend_heap(&mut self, bytes: usize) -> AllocResult<FreeBlock> {
        let size = align(bytes, DSIZE);
        let start = self.arena.grow(size)?;

        // The new block's header overwrites the old epilogue.
        let block = self.arena.write_free(Block::at(start), size);
        self.arena.write_epilogue(start + size - WSIZE);

        self.index.insert(&mut self.arena, &block);
        Ok(self.index.coalesce(&mut self.arena, block))
    }

    /// Tags `block` free with `size` bytes, registers it and merges it with
    /// its neighbours.
    fn free_block(&mut self, block: Block, size: usize) -> FreeBlock {
        let block = self.arena.write_free(block, size);
        self.index.insert(&mut self.arena, &block);
        self.index.coalesce(&mut self.arena, block)
    }
}
