use crate::{arena::Arena, store::BackingStore};

/// Size of a boundary tag (header or footer) in bytes.
pub(crate) const WSIZE: usize = 4;

/// Double word. Every block size is a multiple of this, and the per-block
/// overhead (header + footer) is exactly one.
pub(crate) const DSIZE: usize = 8;

/// Size of a free-list link stored in the payload of a free block.
pub(crate) const LINK_SIZE: usize = 8;

/// Smallest block we can ever create: header, one link, footer.
pub(crate) const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

/// Low bit of a tag word, set when the block is allocated.
const ALLOCATED_BIT: u32 = 0x1;

/// Decoded boundary tag: the `(size, allocated)` pair stored at both ends of
/// every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tag {
    pub size: usize,
    pub allocated: bool,
}

impl Tag {
    /// Zero sized allocated marker sitting at the very end of the arena.
    pub const EPILOGUE: Tag = Tag::allocated(0);

    pub const fn allocated(size: usize) -> Self {
        Self {
            size,
            allocated: true,
        }
    }

    pub const fn free(size: usize) -> Self {
        Self {
            size,
            allocated: false,
        }
    }

    #[inline]
    pub fn pack(self) -> u32 {
        debug_assert_eq!(self.size % DSIZE, 0, "block size must be double-word aligned");
        self.size as u32 | if self.allocated { ALLOCATED_BIT } else { 0 }
    }

    #[inline]
    pub fn unpack(word: u32) -> Self {
        Self {
            size: (word & !0x7) as usize,
            allocated: word & ALLOCATED_BIT != 0,
        }
    }
}

/// A block of the arena, identified by the offset of its payload. The header
/// tag sits right before the payload.
///
/// ```text
///  header                payload                   footer
/// +--------+-------------------------------------+--------+
/// | size|a |                 ...                 | size|a |
/// +--------+-------------------------------------+--------+
///          ^
///          Block offset (what a Handle carries)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Block(usize);

impl Block {
    #[inline]
    pub const fn at(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn header(self) -> usize {
        self.0 - WSIZE
    }
}

/// Something that owns a forward link: either a class sentinel inside the
/// prologue or a free block. The forward link always lives at the node offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Node(usize);

impl Node {
    #[inline]
    pub const fn at(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// A block that was free when this value was produced.
///
/// The payload of a free block holds the free-list links:
///
/// ```text
/// +--------+-----------+-----------+-------+--------+
/// | header |   next    |   prev    |  ...  | footer |
/// +--------+-----------+-----------+-------+--------+
///          0           8           16
/// ```
///
/// Blocks of the smallest class (16 bytes) only have room for `next`.
///
/// Links can only be read through a `FreeBlock`. The value is not `Copy`:
/// turning the block allocated again ([`Arena::write_allocated`]) consumes it,
/// so nothing can keep reading links out of what is now caller data.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FreeBlock(Block);

impl FreeBlock {
    #[inline]
    pub fn block(&self) -> Block {
        self.0
    }

    #[inline]
    pub fn node(&self) -> Node {
        Node(self.0.offset())
    }
}

/// State of a block as read from its header.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum BlockView {
    Allocated(Block),
    Free(FreeBlock),
}

impl<S: BackingStore> Arena<S> {
    #[inline]
    pub fn header(&self, block: Block) -> Tag {
        Tag::unpack(self.word(block.header()))
    }

    /// Footer of `block`, located through the size stored in its header.
    #[inline]
    pub fn footer(&self, block: Block) -> Tag {
        Tag::unpack(self.word(self.footer_offset(block)))
    }

    #[inline]
    fn footer_offset(&self, block: Block) -> usize {
        block.offset() + self.header(block).size - DSIZE
    }

    #[inline]
    pub fn size_of(&self, block: Block) -> usize {
        self.header(block).size
    }

    /// Writes the same tag at both ends of a block of `tag.size` bytes.
    pub fn write_tags(&mut self, block: Block, tag: Tag) {
        let word = tag.pack();
        self.set_word(block.header(), word);
        self.set_word(block.offset() + tag.size - DSIZE, word);
    }

    /// Retags `block` as a free block of `size` bytes.
    pub fn write_free(&mut self, block: Block, size: usize) -> FreeBlock {
        self.write_tags(block, Tag::free(size));
        FreeBlock(block)
    }

    /// Retags a free block as allocated with `size` bytes. The caller must have
    /// removed it from its class already.
    pub fn write_allocated(&mut self, block: FreeBlock, size: usize) -> Block {
        let block = block.0;
        self.write_tags(block, Tag::allocated(size));
        block
    }

    /// Writes the epilogue header at `header_offset`.
    pub fn write_epilogue(&mut self, header_offset: usize) {
        self.set_word(header_offset, Tag::EPILOGUE.pack());
    }

    /// Physically next block. For the last block this is the epilogue.
    #[inline]
    pub fn next_block(&self, block: Block) -> Block {
        Block::at(block.offset() + self.size_of(block))
    }

    /// Physically previous block, found through its footer.
    #[inline]
    pub fn prev_block(&self, block: Block) -> Block {
        let prev_footer = Tag::unpack(self.word(block.offset() - DSIZE));
        Block::at(block.offset() - prev_footer.size)
    }

    pub fn view(&self, block: Block) -> BlockView {
        if self.header(block).allocated {
            BlockView::Allocated(block)
        } else {
            BlockView::Free(FreeBlock(block))
        }
    }

    #[inline]
    pub fn as_free(&self, block: Block) -> Option<FreeBlock> {
        match self.view(block) {
            BlockView::Free(free) => Some(free),
            BlockView::Allocated(_) => None,
        }
    }

    /// Forward link of a sentinel or free block.
    #[inline]
    pub fn next_link(&self, node: Node) -> Option<FreeBlock> {
        match self.link(node.offset()) {
            0 => None,
            offset => Some(FreeBlock(Block::at(offset))),
        }
    }

    #[inline]
    pub fn set_next_link(&mut self, node: Node, next: Option<&FreeBlock>) {
        self.set_link(node.offset(), next.map_or(0, |next| next.0.offset()));
    }

    /// Backward link. Only meaningful for blocks bigger than the minimum size.
    #[inline]
    pub fn prev_link(&self, block: &FreeBlock) -> Node {
        debug_assert!(self.size_of(block.0) > MIN_BLOCK_SIZE);
        Node(self.link(block.0.offset() + LINK_SIZE))
    }

    #[inline]
    pub fn set_prev_link(&mut self, block: &FreeBlock, prev: Node) {
        debug_assert!(self.size_of(block.0) > MIN_BLOCK_SIZE);
        self.set_link(block.0.offset() + LINK_SIZE, prev.offset());
    }

    /// Bytes of `block` available to the caller.
    #[inline]
    pub fn payload(&self, block: Block) -> &[u8] {
        self.bytes(block.offset(), self.size_of(block) - DSIZE)
    }

    #[inline]
    pub fn payload_mut(&mut self, block: Block) -> &mut [u8] {
        let len = self.size_of(block) - DSIZE;
        self.bytes_mut(block.offset(), len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VecStore;

    fn arena_with(len: usize) -> Arena<VecStore> {
        let mut arena = Arena::new(VecStore::new());
        arena.grow(len).unwrap();
        arena
    }

    #[test]
    fn tags_pack_size_and_bit() {
        assert_eq!(Tag::allocated(24).pack(), 25);
        assert_eq!(Tag::free(4096).pack(), 4096);
        assert_eq!(Tag::unpack(25), Tag::allocated(24));
        assert_eq!(Tag::unpack(0x1), Tag::EPILOGUE);
    }

    #[test]
    fn tags_are_written_at_both_ends() {
        let mut arena = arena_with(64);
        let block = Block::at(8);

        arena.write_tags(block, Tag::allocated(32));

        assert_eq!(arena.header(block), Tag::allocated(32));
        assert_eq!(arena.footer(block), Tag::allocated(32));
        assert_eq!(arena.word(4), 33);
        assert_eq!(arena.word(32), 33);
        assert_eq!(arena.payload(block).len(), 24);
    }

    #[test]
    fn neighbours_are_found_through_tags() {
        let mut arena = arena_with(64);
        let first = Block::at(8);
        let second = Block::at(24);

        arena.write_tags(first, Tag::allocated(16));
        arena.write_tags(second, Tag::free(32));
        arena.write_epilogue(52);

        assert_eq!(arena.next_block(first), second);
        assert_eq!(arena.prev_block(second), first);
        assert_eq!(arena.header(arena.next_block(second)), Tag::EPILOGUE);
        assert_eq!(arena.view(first), BlockView::Allocated(first));
        assert!(arena.as_free(second).is_some());
    }

    #[test]
    fn links_live_in_free_payload() {
        let mut arena = arena_with(96);
        let a = arena.write_free(Block::at(8), 32);
        let b = arena.write_free(Block::at(40), 32);

        arena.set_next_link(a.node(), Some(&b));
        arena.set_prev_link(&b, a.node());
        arena.set_next_link(b.node(), None);

        assert_eq!(arena.next_link(a.node()), Some(FreeBlock(Block::at(40))));
        assert_eq!(arena.prev_link(&b), a.node());
        assert_eq!(arena.next_link(b.node()), None);
    }

    #[test]
    fn allocating_consumes_free_view() {
        let mut arena = arena_with(48);
        let free = arena.write_free(Block::at(8), 32);
        let block = arena.write_allocated(free, 32);

        assert_eq!(arena.as_free(block), None);
        assert!(arena.header(block).allocated);
    }
}
