/*!
 * Heap Checker
 * Walks the arena and the free lists and verifies every invariant
 */

use std::{collections::HashSet, fmt};

use tracing::{debug, error, trace};

use crate::{
    allocator::{Allocator, BOOTSTRAP_SIZE, PROLOGUE_SIZE},
    arena::Arena,
    block::{Block, DSIZE, MIN_BLOCK_SIZE, Tag, WSIZE},
    error::HeapError,
    freelist::{CLASS_COUNT, class_of, is_doubly_linked},
    store::BackingStore,
};

/// One block of the arena as seen by [`Allocator::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload offset, the same value a [`crate::Handle`] carries.
    pub offset: usize,
    /// Total size including the boundary tags.
    pub size: usize,
    pub allocated: bool,
}

/// Summary produced by a successful [`Allocator::check_heap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes granted by the backing store to this allocator.
    pub heap_size: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub largest_free: usize,
    /// Number of free blocks in each size class.
    pub class_lengths: [usize; CLASS_COUNT],
}

/// Iterator over every block between the prologue and the epilogue.
///
/// Stops early, instead of reading out of bounds, if a tag is corrupted.
pub struct HeapWalk<'a, S> {
    arena: &'a Arena<S>,
    current: Option<Block>,
}

impl<S: BackingStore> Iterator for HeapWalk<'_, S> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current.take()?;
        if block.offset() > self.arena.len() {
            return None;
        }

        let tag = self.arena.header(block);
        if tag.size == 0 || block.offset() + tag.size > self.arena.len() {
            return None;
        }

        self.current = Some(self.arena.next_block(block));

        Some(BlockInfo {
            offset: block.offset(),
            size: tag.size,
            allocated: tag.allocated,
        })
    }
}

impl<S: BackingStore> Allocator<S> {
    /// Walks every block of the arena in address order. Empty before init.
    pub fn blocks(&self) -> HeapWalk<'_, S> {
        HeapWalk {
            arena: &self.arena,
            current: self.origin.map(|origin| Block::at(origin + BOOTSTRAP_SIZE)),
        }
    }

    /// Verifies every heap invariant:
    ///
    /// - prologue and epilogue are intact and the epilogue ends the arena;
    /// - every block is aligned, at least the minimum size, and its header
    ///   matches its footer;
    /// - no two adjacent blocks are both free;
    /// - block sizes plus the bootstrap region add up to the bytes granted;
    /// - every free block is reachable from exactly one class, the one its
    ///   size maps to, with consistent backward links and frontier;
    /// - nothing allocated is reachable from a class.
    ///
    /// An allocator that was never initialised is trivially consistent.
    pub fn check_heap(&self) -> Result<HeapStats, HeapError> {
        let Some(origin) = self.origin else {
            return Ok(HeapStats::default());
        };

        let arena = &self.arena;
        let len = arena.len();
        let mut stats = HeapStats {
            heap_size: len - origin,
            ..HeapStats::default()
        };

        let prologue = Block::at(origin + DSIZE);
        if arena.header(prologue) != Tag::allocated(PROLOGUE_SIZE)
            || arena.footer(prologue) != Tag::allocated(PROLOGUE_SIZE)
        {
            return Err(HeapError::BadPrologue {
                offset: prologue.offset(),
            });
        }

        let mut free = HashSet::new();
        let mut accounted = BOOTSTRAP_SIZE;
        let mut prev_free: Option<usize> = None;
        let mut block = arena.next_block(prologue);

        loop {
            if block.header() + WSIZE > len {
                return Err(HeapError::BadEpilogue {
                    offset: block.offset(),
                });
            }

            let header = arena.header(block);
            if header.size == 0 {
                break;
            }

            if block.offset() + header.size > len {
                return Err(HeapError::OutOfBounds {
                    offset: block.offset(),
                    size: header.size,
                });
            }
            if block.offset() % DSIZE != 0 || header.size % DSIZE != 0 {
                return Err(HeapError::Misaligned {
                    offset: block.offset(),
                    size: header.size,
                });
            }
            if header.size < MIN_BLOCK_SIZE {
                return Err(HeapError::Undersized {
                    offset: block.offset(),
                    size: header.size,
                });
            }

            let footer = arena.footer(block);
            if header != footer {
                return Err(HeapError::TagMismatch {
                    offset: block.offset(),
                    header_size: header.size,
                    header_allocated: header.allocated,
                    footer_size: footer.size,
                    footer_allocated: footer.allocated,
                });
            }

            if header.allocated {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += header.size;
                prev_free = None;
            } else {
                if let Some(first) = prev_free {
                    return Err(HeapError::AdjacentFree {
                        first,
                        second: block.offset(),
                    });
                }
                stats.free_blocks += 1;
                stats.free_bytes += header.size;
                stats.largest_free = stats.largest_free.max(header.size);
                free.insert(block.offset());
                prev_free = Some(block.offset());
            }

            accounted += header.size;
            block = arena.next_block(block);
        }

        if !arena.header(block).allocated || block.header() + WSIZE != len {
            return Err(HeapError::BadEpilogue {
                offset: block.offset(),
            });
        }

        if accounted != stats.heap_size {
            return Err(HeapError::Conservation {
                accounted,
                granted: stats.heap_size,
            });
        }

        let mut listed = HashSet::new();
        for class in 0..CLASS_COUNT {
            let mut pred = self.index.sentinel(class);
            let mut next = arena.next_link(pred);

            // Links are validated before they are followed, so a corrupted
            // chain is reported instead of read out of bounds.
            while let Some(member) = next {
                let offset = member.block().offset();

                if !listed.insert(offset) {
                    // Also catches cycles.
                    return Err(HeapError::ListedTwice { offset });
                }
                if !free.contains(&offset) {
                    return Err(HeapError::ListedAllocated { offset, class });
                }

                let size = arena.size_of(member.block());
                if class_of(size) != class {
                    return Err(HeapError::WrongClass {
                        offset,
                        size,
                        class,
                        expected: class_of(size),
                    });
                }
                if is_doubly_linked(class) && arena.prev_link(&member) != pred {
                    return Err(HeapError::BrokenBackLink { offset });
                }

                stats.class_lengths[class] += 1;
                pred = member.node();
                next = arena.next_link(pred);
            }

            if self.index.frontier(class) != pred {
                return Err(HeapError::StaleFrontier { class });
            }
        }

        if let Some(&offset) = free.difference(&listed).min() {
            return Err(HeapError::Unlisted { offset });
        }

        Ok(stats)
    }

    /// Fail-fast consistency check.
    ///
    /// Runs [`Allocator::check_heap`] and aborts the process if any invariant
    /// is broken, a corrupted heap cannot be trusted to keep running.
    /// `context` identifies the call site in the log.
    pub fn checkheap(&self, context: impl fmt::Display) {
        match self.check_heap() {
            Ok(stats) => {
                debug!(%context, ?stats, "heap consistent");
                for block in self.blocks() {
                    trace!(
                        offset = block.offset,
                        size = block.size,
                        allocated = block.allocated,
                        "block"
                    );
                }
            }
            Err(err) => {
                error!(%context, %err, "heap invariant violated");
                std::process::abort();
            }
        }
    }
}
