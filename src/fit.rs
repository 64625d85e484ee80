use crate::{
    arena::Arena,
    block::{Block, FreeBlock, MIN_BLOCK_SIZE, Tag},
    freelist::{CLASS_COUNT, FreeListIndex, class_of},
    store::BackingStore,
};

/// Classes searched first-fit. Every class from here on is searched
/// best-fit within the class.
pub(crate) const FIRST_FIT_CLASSES: usize = 2;

impl FreeListIndex {
    /// Looks for a free block of at least `asize` bytes.
    ///
    /// The search starts at the class of `asize` and moves towards bigger
    /// classes. The two smallest classes return the first (oldest) block that
    /// fits. Bigger classes are scanned entirely and return their tightest
    /// block; the first class with any candidate wins, even if a later class
    /// holds a tighter one.
    pub(crate) fn find_fit<S: BackingStore>(&self, arena: &Arena<S>, asize: usize) -> Option<FreeBlock> {
        let start = class_of(asize);

        for class in start..FIRST_FIT_CLASSES {
            let fit = self
                .chain(arena, class)
                .find(|block| arena.size_of(block.block()) >= asize);

            if fit.is_some() {
                return fit;
            }
        }

        for class in start.max(FIRST_FIT_CLASSES)..CLASS_COUNT {
            if self.is_empty(class) {
                continue;
            }

            let mut best: Option<(usize, FreeBlock)> = None;

            for block in self.chain(arena, class) {
                let size = arena.size_of(block.block());
                if size < asize {
                    continue;
                }
                // Ties go to the newer block.
                if best.as_ref().is_none_or(|(best_size, _)| size <= *best_size) {
                    best = Some((size, block));
                }
            }

            if let Some((_, block)) = best {
                return Some(block);
            }
        }

        None
    }

    /// Carves an allocated block of `asize` bytes out of the free `block`.
    ///
    /// When the leftover would be at least a minimum block, the allocated part
    /// is taken from the end and the front stays free (in whatever class its
    /// new size falls in). Otherwise the whole block is handed out and the
    /// slack is accepted as internal fragmentation.
    pub(crate) fn place<S: BackingStore>(
        &mut self,
        arena: &mut Arena<S>,
        block: FreeBlock,
        asize: usize,
    ) -> Block {
        let csize = arena.size_of(block.block());
        debug_assert!(csize >= asize);

        self.remove(arena, &block);

        if csize - asize >= MIN_BLOCK_SIZE {
            let rest = arena.write_free(block.block(), csize - asize);
            let allocated = arena.next_block(rest.block());
            arena.write_tags(allocated, Tag::allocated(asize));
            self.insert(arena, &rest);

            allocated
        } else {
            arena.write_allocated(block, csize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freelist::tests::{empty_heap, push_allocated, push_free};

    #[test]
    fn small_classes_use_first_fit() {
        let (mut arena, mut index) = empty_heap();
        let older = push_free(&mut arena, 32);
        push_allocated(&mut arena, 16);
        let newer = push_free(&mut arena, 24);
        index.insert(&mut arena, &older);
        index.insert(&mut arena, &newer);

        let fit = index.find_fit(&arena, 24).unwrap();

        // The tighter block is newer, first fit still takes the oldest.
        assert_eq!(fit, older);
    }

    #[test]
    fn small_request_skips_blocks_that_are_too_small() {
        let (mut arena, mut index) = empty_heap();
        let small = push_free(&mut arena, 24);
        push_allocated(&mut arena, 16);
        let big = push_free(&mut arena, 32);
        index.insert(&mut arena, &small);
        index.insert(&mut arena, &big);

        assert_eq!(index.find_fit(&arena, 32), Some(big));
    }

    #[test]
    fn larger_classes_use_best_fit() {
        let (mut arena, mut index) = empty_heap();
        let loose = push_free(&mut arena, 120);
        push_allocated(&mut arena, 16);
        let tight = push_free(&mut arena, 80);
        push_allocated(&mut arena, 16);
        let too_small = push_free(&mut arena, 72);
        for block in [&loose, &tight, &too_small] {
            index.insert(&mut arena, block);
        }

        assert_eq!(index.find_fit(&arena, 80), Some(tight));
    }

    #[test]
    fn best_fit_ties_prefer_newer_block() {
        let (mut arena, mut index) = empty_heap();
        let first = push_free(&mut arena, 200);
        push_allocated(&mut arena, 16);
        let second = push_free(&mut arena, 200);
        index.insert(&mut arena, &first);
        index.insert(&mut arena, &second);

        assert_eq!(index.find_fit(&arena, 160), Some(second));
    }

    #[test]
    fn class_without_candidate_is_skipped() {
        let (mut arena, mut index) = empty_heap();
        let short = push_free(&mut arena, 560);
        push_allocated(&mut arena, 16);
        let larger = push_free(&mut arena, 2048);
        push_allocated(&mut arena, 16);
        let largest = push_free(&mut arena, 4096);
        for block in [&short, &larger, &largest] {
            index.insert(&mut arena, block);
        }

        // 560 shares the request's class but is too small.
        assert_eq!(index.find_fit(&arena, 600), Some(larger));
    }

    #[test]
    fn search_moves_to_bigger_classes() {
        let (mut arena, mut index) = empty_heap();
        let block = push_free(&mut arena, 9000);
        index.insert(&mut arena, &block);

        assert_eq!(index.find_fit(&arena, 16), Some(block));
        assert_eq!(index.find_fit(&arena, 9008), None);
    }

    #[test]
    fn place_splits_from_the_end() {
        let (mut arena, mut index) = empty_heap();
        let block = push_free(&mut arena, 512);
        let offset = block.block().offset();
        index.insert(&mut arena, &block);

        let allocated = index.place(&mut arena, block, 40);

        assert_eq!(allocated.offset(), offset + 472);
        assert_eq!(arena.header(allocated), Tag::allocated(40));
        assert_eq!(arena.footer(allocated), Tag::allocated(40));
        assert_eq!(arena.header(Block::at(offset)), Tag::free(472));
        assert_eq!(index.chain(&arena, class_of(472)).count(), 1);
    }

    #[test]
    fn place_moves_remainder_to_its_new_class() {
        let (mut arena, mut index) = empty_heap();
        let block = push_free(&mut arena, 64);
        let offset = block.block().offset();
        index.insert(&mut arena, &block);

        index.place(&mut arena, block, 48);

        assert!(index.is_empty(class_of(64)));
        let rest = index.chain(&arena, 0).next().unwrap();
        assert_eq!(rest.block().offset(), offset);
        assert_eq!(arena.size_of(rest.block()), 16);
    }

    #[test]
    fn place_keeps_small_slack() {
        let (mut arena, mut index) = empty_heap();
        let block = push_free(&mut arena, 48);
        let offset = block.block().offset();
        index.insert(&mut arena, &block);

        let allocated = index.place(&mut arena, block, 40);

        assert_eq!(allocated.offset(), offset);
        assert_eq!(arena.header(allocated), Tag::allocated(48));
        assert!(index.is_empty(class_of(48)));
    }
}
