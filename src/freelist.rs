use crate::{
    arena::Arena,
    block::{DSIZE, FreeBlock, Node},
    store::BackingStore,
};

/// Number of size classes.
pub const CLASS_COUNT: usize = 11;

/// Inclusive upper bound of every class but the last one, which is unbounded.
pub const CLASS_BOUNDS: [usize; CLASS_COUNT - 1] =
    [16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192];

/// Returns the smallest class whose upper bound is at least `size`.
pub fn class_of(size: usize) -> usize {
    CLASS_BOUNDS
        .iter()
        .position(|&bound| size <= bound)
        .unwrap_or(CLASS_COUNT - 1)
}

/// Only class 0 (16 byte blocks) is singly linked, its blocks have no room for
/// a backward link.
#[inline]
pub(crate) fn is_doubly_linked(class: usize) -> bool {
    class > 0
}

/// Segregated list of free blocks.
///
/// Each class has a sentinel slot inside the prologue block and a frontier.
/// The sentinel's forward link points at the oldest free block of the class,
/// the frontier is the most recently inserted one (the sentinel itself while
/// the class is empty). Blocks are appended at the frontier, so a chain read
/// from its sentinel is in insertion order.
///
/// ```text
///   prologue payload                          frontier[1]
/// +----+----+----+-- ... --+                      |
/// | s0 | s1 | s2 |         |                      v
/// +----+----+----+-- ... --+      +------+      +------+
///        |                        | Free | ---> | Free | ---> None
///        +----------------------> |  24  | <--- |  32  |
///                                 +------+      +------+
/// ```
///
/// The list itself never allocates: links are stored in the payload of the
/// free blocks (see [`FreeBlock`]), the only state kept here is one frontier
/// per class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FreeListIndex {
    /// Offset of the class 0 sentinel. Sentinels are laid out one link apart.
    base: usize,
    /// Most recently inserted node of each class.
    frontier: [Node; CLASS_COUNT],
}

/// Iterator over the free blocks of one class, oldest first.
pub(crate) struct Chain<'a, S> {
    arena: &'a Arena<S>,
    current: Option<FreeBlock>,
}

impl FreeListIndex {
    /// Creates an index whose sentinels start at `base`. Every class starts
    /// empty, so every frontier is its own sentinel.
    pub fn new(base: usize) -> Self {
        Self {
            base,
            frontier: std::array::from_fn(|class| Node::at(base + class * DSIZE)),
        }
    }

    #[inline]
    pub fn sentinel(&self, class: usize) -> Node {
        Node::at(self.base + class * DSIZE)
    }

    #[inline]
    pub fn frontier(&self, class: usize) -> Node {
        self.frontier[class]
    }

    pub fn is_empty(&self, class: usize) -> bool {
        self.frontier[class] == self.sentinel(class)
    }

    /// Clears every sentinel slot in the arena.
    pub fn reset<S: BackingStore>(&mut self, arena: &mut Arena<S>) {
        for class in 0..CLASS_COUNT {
            arena.set_next_link(self.sentinel(class), None);
            self.frontier[class] = self.sentinel(class);
        }
    }

    /// Walks the chain of `class` from its sentinel.
    pub fn chain<'a, S: BackingStore>(&self, arena: &'a Arena<S>, class: usize) -> Chain<'a, S> {
        Chain {
            arena,
            current: arena.next_link(self.sentinel(class)),
        }
    }

    /// Appends `block` at the frontier of the class matching its current size.
    pub fn insert<S: BackingStore>(&mut self, arena: &mut Arena<S>, block: &FreeBlock) {
        let class = class_of(arena.size_of(block.block()));
        let tail = self.frontier[class];

        arena.set_next_link(tail, Some(block));
        if is_doubly_linked(class) {
            arena.set_prev_link(block, tail);
        }
        arena.set_next_link(block.node(), None);

        self.frontier[class] = block.node();
    }

    /// Unlinks `block` from the class matching its current size.
    pub fn remove<S: BackingStore>(&mut self, arena: &mut Arena<S>, block: &FreeBlock) {
        let class = class_of(arena.size_of(block.block()));
        let next = arena.next_link(block.node());

        let pred = if is_doubly_linked(class) {
            arena.prev_link(block)
        } else {
            // No backward link, walk from the sentinel to the predecessor.
            let mut pred = self.sentinel(class);
            loop {
                match arena.next_link(pred) {
                    Some(ref current) if current == block => break,
                    Some(current) => pred = current.node(),
                    None => {
                        debug_assert!(false, "block {:?} missing from class {class}", block);
                        return;
                    }
                }
            }
            pred
        };

        match next {
            None => {
                // `block` was the frontier, its predecessor takes over.
                self.frontier[class] = pred;
                arena.set_next_link(pred, None);
            }
            Some(next) => {
                arena.set_next_link(pred, Some(&next));
                if is_doubly_linked(class) {
                    arena.set_prev_link(&next, pred);
                }
            }
        }
    }
}

impl<S: BackingStore> Iterator for Chain<'_, S> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        self.current = self.arena.next_link(current.node());

        Some(current)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::block::{Block, Tag, WSIZE};
    use crate::store::VecStore;

    /// Arena with an empty prologue whose sentinels start at offset 8 and
    /// no blocks yet (the epilogue sits at the end).
    pub(crate) fn empty_heap() -> (Arena<VecStore>, FreeListIndex) {
        let mut arena = Arena::new(VecStore::new());
        let prologue = DSIZE * (CLASS_COUNT + 1);
        arena.grow(WSIZE + prologue + WSIZE).unwrap();
        arena.write_tags(Block::at(DSIZE), Tag::allocated(prologue));
        arena.write_epilogue(WSIZE + prologue);

        let mut index = FreeListIndex::new(DSIZE);
        index.reset(&mut arena);

        (arena, index)
    }

    /// Appends a free block of `size` bytes right before the epilogue. It is
    /// neither coalesced nor inserted.
    pub(crate) fn push_free(arena: &mut Arena<VecStore>, size: usize) -> FreeBlock {
        let start = arena.grow(size).unwrap();
        let block = arena.write_free(Block::at(start), size);
        arena.write_epilogue(start + size - WSIZE);
        block
    }

    /// Appends an allocated block, used as a separator between free blocks.
    pub(crate) fn push_allocated(arena: &mut Arena<VecStore>, size: usize) -> Block {
        let start = arena.grow(size).unwrap();
        arena.write_tags(Block::at(start), Tag::allocated(size));
        arena.write_epilogue(start + size - WSIZE);
        Block::at(start)
    }

    fn offsets(index: &FreeListIndex, arena: &Arena<VecStore>, class: usize) -> Vec<usize> {
        index.chain(arena, class).map(|b| b.block().offset()).collect()
    }

    #[test]
    fn class_boundaries() {
        assert_eq!(class_of(16), 0);
        assert_eq!(class_of(24), 1);
        assert_eq!(class_of(32), 1);
        assert_eq!(class_of(40), 2);
        assert_eq!(class_of(512), 5);
        assert_eq!(class_of(520), 6);
        assert_eq!(class_of(8192), 9);
        assert_eq!(class_of(8200), 10);
        assert_eq!(class_of(1 << 30), 10);
    }

    #[test]
    fn new_index_is_empty() {
        let (arena, index) = empty_heap();

        for class in 0..CLASS_COUNT {
            assert!(index.is_empty(class));
            assert_eq!(index.chain(&arena, class).count(), 0);
        }
    }

    #[test]
    fn insert_keeps_fifo_order() {
        let (mut arena, mut index) = empty_heap();
        let a = push_free(&mut arena, 48);
        push_allocated(&mut arena, 16);
        let b = push_free(&mut arena, 64);
        push_allocated(&mut arena, 16);
        let c = push_free(&mut arena, 40);

        index.insert(&mut arena, &a);
        index.insert(&mut arena, &b);
        index.insert(&mut arena, &c);

        let class = class_of(48);
        assert_eq!(
            offsets(&index, &arena, class),
            vec![a.block().offset(), b.block().offset(), c.block().offset()]
        );
        assert_eq!(index.frontier(class), c.node());
        assert_eq!(arena.prev_link(&a), index.sentinel(class));
        assert_eq!(arena.prev_link(&c), b.node());
    }

    #[test]
    fn remove_from_doubly_linked_class() {
        let (mut arena, mut index) = empty_heap();
        let a = push_free(&mut arena, 24);
        push_allocated(&mut arena, 16);
        let b = push_free(&mut arena, 32);
        push_allocated(&mut arena, 16);
        let c = push_free(&mut arena, 24);

        for block in [&a, &b, &c] {
            index.insert(&mut arena, block);
        }

        // Middle block: neighbours are spliced together.
        index.remove(&mut arena, &b);
        assert_eq!(offsets(&index, &arena, 1), vec![a.block().offset(), c.block().offset()]);
        assert_eq!(arena.prev_link(&c), a.node());

        // Frontier: it moves back to the predecessor.
        index.remove(&mut arena, &c);
        assert_eq!(index.frontier(1), a.node());
        assert_eq!(offsets(&index, &arena, 1), vec![a.block().offset()]);

        index.remove(&mut arena, &a);
        assert!(index.is_empty(1));
        assert_eq!(arena.next_link(index.sentinel(1)), None);
    }

    #[test]
    fn remove_from_singly_linked_class() {
        let (mut arena, mut index) = empty_heap();
        let mut blocks = Vec::new();
        for _ in 0..4 {
            blocks.push(push_free(&mut arena, 16));
            push_allocated(&mut arena, 16);
        }
        for block in &blocks {
            index.insert(&mut arena, block);
        }

        index.remove(&mut arena, &blocks[1]);
        index.remove(&mut arena, &blocks[3]);

        assert_eq!(
            offsets(&index, &arena, 0),
            vec![blocks[0].block().offset(), blocks[2].block().offset()]
        );
        assert_eq!(index.frontier(0), blocks[2].node());

        index.remove(&mut arena, &blocks[0]);
        index.remove(&mut arena, &blocks[2]);
        assert!(index.is_empty(0));
    }

    #[test]
    fn reinsert_after_emptying() {
        let (mut arena, mut index) = empty_heap();
        let a = push_free(&mut arena, 4096);

        index.insert(&mut arena, &a);
        index.remove(&mut arena, &a);
        index.insert(&mut arena, &a);

        assert_eq!(offsets(&index, &arena, class_of(4096)), vec![a.block().offset()]);
    }
}
