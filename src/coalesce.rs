use crate::{arena::Arena, block::FreeBlock, freelist::FreeListIndex, store::BackingStore};

impl FreeListIndex {
    /// Merges the free `block` with whichever physical neighbours are free and
    /// returns the resulting block, registered in the class matching its new
    /// size.
    ///
    /// `block` must already be tagged free and inserted. The neighbours are
    /// found through the boundary tags in constant time, the prologue and the
    /// epilogue are always allocated so the first and last blocks need no
    /// special casing.
    ///
    /// ```text
    ///  Case 1:  [ A ][ F ][ A ]  ->  nothing to do
    ///  Case 2:  [ A ][ F ][ f ]  ->  [ A ][   F    ]
    ///  Case 3:  [ f ][ F ][ A ]  ->  [    F   ][ A ]
    ///  Case 4:  [ f ][ F ][ f ]  ->  [      F      ]
    /// ```
    pub(crate) fn coalesce<S: BackingStore>(
        &mut self,
        arena: &mut Arena<S>,
        block: FreeBlock,
    ) -> FreeBlock {
        let prev = arena.as_free(arena.prev_block(block.block()));
        let next = arena.as_free(arena.next_block(block.block()));

        let merged = match (prev, next) {
            (None, None) => return block,

            (None, Some(next)) => {
                let size = arena.size_of(block.block()) + arena.size_of(next.block());
                self.remove(arena, &block);
                self.remove(arena, &next);
                arena.write_free(block.block(), size)
            }

            (Some(prev), None) => {
                let size = arena.size_of(prev.block()) + arena.size_of(block.block());
                self.remove(arena, &prev);
                self.remove(arena, &block);
                arena.write_free(prev.block(), size)
            }

            (Some(prev), Some(next)) => {
                let size = arena.size_of(prev.block())
                    + arena.size_of(block.block())
                    + arena.size_of(next.block());
                self.remove(arena, &prev);
                self.remove(arena, &block);
                self.remove(arena, &next);
                arena.write_free(prev.block(), size)
            }
        };

        self.insert(arena, &merged);
        merged
    }
}

#[cfg(test)]
mod tests {
    use crate::block::Tag;
    use crate::freelist::{
        class_of,
        tests::{empty_heap, push_allocated, push_free},
    };

    #[test]
    fn isolated_block_is_untouched() {
        let (mut arena, mut index) = empty_heap();
        push_allocated(&mut arena, 32);
        let block = push_free(&mut arena, 48);
        push_allocated(&mut arena, 32);
        index.insert(&mut arena, &block);

        let offset = block.block().offset();
        let merged = index.coalesce(&mut arena, block);

        assert_eq!(merged.block().offset(), offset);
        assert_eq!(arena.header(merged.block()), Tag::free(48));
    }

    #[test]
    fn merges_with_next() {
        let (mut arena, mut index) = empty_heap();
        push_allocated(&mut arena, 32);
        let block = push_free(&mut arena, 24);
        let next = push_free(&mut arena, 40);
        index.insert(&mut arena, &block);
        index.insert(&mut arena, &next);

        let offset = block.block().offset();
        let merged = index.coalesce(&mut arena, block);

        assert_eq!(merged.block().offset(), offset);
        assert_eq!(arena.header(merged.block()), Tag::free(64));
        assert_eq!(arena.footer(merged.block()), Tag::free(64));
        assert!(index.is_empty(class_of(24)));
        assert_eq!(index.chain(&arena, class_of(64)).count(), 1);
    }

    #[test]
    fn merges_with_prev() {
        let (mut arena, mut index) = empty_heap();
        let prev = push_free(&mut arena, 16);
        let block = push_free(&mut arena, 48);
        push_allocated(&mut arena, 32);
        index.insert(&mut arena, &prev);
        index.insert(&mut arena, &block);

        let prev_offset = prev.block().offset();
        let merged = index.coalesce(&mut arena, block);

        assert_eq!(merged.block().offset(), prev_offset);
        assert_eq!(arena.header(merged.block()), Tag::free(64));
        assert!(index.is_empty(0));
        assert_eq!(index.chain(&arena, class_of(64)).count(), 1);
    }

    #[test]
    fn merges_both_neighbours() {
        let (mut arena, mut index) = empty_heap();
        let prev = push_free(&mut arena, 128);
        let block = push_free(&mut arena, 32);
        let next = push_free(&mut arena, 256);
        for free in [&prev, &block, &next] {
            index.insert(&mut arena, free);
        }

        let prev_offset = prev.block().offset();
        let merged = index.coalesce(&mut arena, block);

        assert_eq!(merged.block().offset(), prev_offset);
        assert_eq!(arena.header(merged.block()), Tag::free(416));
        assert_eq!(arena.footer(merged.block()), Tag::free(416));
        assert!(index.is_empty(class_of(128)));
        assert!(index.is_empty(class_of(32)));
        assert!(index.is_empty(class_of(256)));
        assert_eq!(index.chain(&arena, class_of(416)).count(), 1);
        assert_eq!(index.frontier(class_of(416)), merged.node());
    }
}
