//! Read-only views of the block chain: the [`Blocks`] iterator,
//! summary [`HeapStats`], and the printable [`HeapReport`].

use core::fmt;

use crate::{Heap, Source};

use super::region::Chain;
use super::TAG_SIZE;

/// Whether a block is handed out or available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockState {
    Free,
    Allocated,
}

impl BlockState {
    #[inline]
    fn from_flag(is_allocated: bool) -> Self {
        if is_allocated {
            Self::Allocated
        } else {
            Self::Free
        }
    }

    #[inline]
    pub fn is_allocated(self) -> bool {
        self == Self::Allocated
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Free => "FREE",
            Self::Allocated => "alloc",
        })
    }
}

/// One block of the chain, as seen by [`Heap::inspect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockDescriptor {
    /// Position in the chain, starting at 1.
    pub index: usize,
    /// Offset of the header from the first block's header.
    pub offset: usize,
    pub state: BlockState,
    /// The state of the preceding block, as recorded in this block's header.
    pub prev_state: BlockState,
    /// Address of the header.
    pub start: usize,
    /// Address of the last byte of the block.
    pub end: usize,
    /// Block size, header and footer included.
    pub size: usize,
}

impl BlockDescriptor {
    /// Address of the payload, as returned by an allocation.
    #[inline]
    pub fn payload(&self) -> usize {
        self.start + TAG_SIZE
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }
}

/// Iterator over the blocks of a heap, in address order.
///
/// Created by [`Heap::inspect`]. Yields nothing for an uninitialized heap.
#[derive(Debug, Clone)]
pub struct Blocks<'h> {
    chain: Option<Chain<'h>>,
    first: usize,
    index: usize,
}

impl Iterator for Blocks<'_> {
    type Item = BlockDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let (offset, tag) = self.chain.as_mut()?.next()?;

        self.index += 1;
        let start = self.first + offset;

        Some(BlockDescriptor {
            index: self.index,
            offset,
            state: BlockState::from_flag(tag.is_allocated()),
            prev_state: BlockState::from_flag(tag.is_prev_allocated()),
            start,
            end: start + tag.size() - 1,
            size: tag.size(),
        })
    }
}

impl core::iter::FusedIterator for Blocks<'_> {}

/// Totals over every block of a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HeapStats {
    /// Sum of allocated block sizes.
    pub used_bytes: usize,
    /// Sum of free block sizes.
    pub free_bytes: usize,
    /// The usable region size. Always `used_bytes + free_bytes`.
    pub total_bytes: usize,
    pub allocated_blocks: usize,
    pub free_blocks: usize,
}

/// Prints the block table of a heap followed by its totals.
///
/// Created by [`Heap::report`].
///
/// ```text
/// No.   Status  Prev    Begin               End                 Size
/// -------------------------------------------------------------------------
/// 1     alloc   alloc   0x00007f1c2a1e3004  0x00007f1c2a1e306b  104
/// 2     FREE    alloc   0x00007f1c2a1e306c  0x00007f1c2a1e3ffb  3984
/// -------------------------------------------------------------------------
/// Total used size = 104
/// Total free size = 3984
/// Total size      = 4088
/// ```
pub struct HeapReport<'h, S: Source> {
    heap: &'h Heap<S>,
}

impl<S: Source> fmt::Display for HeapReport<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str =
            "-------------------------------------------------------------------------";

        writeln!(f, "{:<6}{:<8}{:<8}{:<20}{:<20}{}", "No.", "Status", "Prev", "Begin", "End", "Size")?;
        writeln!(f, "{}", RULE)?;

        for block in self.heap.inspect() {
            writeln!(
                f,
                "{:<6}{:<8}{:<8}{:<#20x}{:<#20x}{}",
                block.index, block.state, block.prev_state, block.start, block.end, block.size
            )?;
        }

        let stats = self.heap.stats();

        writeln!(f, "{}", RULE)?;
        writeln!(f, "Total used size = {}", stats.used_bytes)?;
        writeln!(f, "Total free size = {}", stats.free_bytes)?;
        writeln!(f, "Total size      = {}", stats.total_bytes)
    }
}

impl<S: Source> fmt::Debug for HeapReport<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapReport").field("stats", &self.heap.stats()).finish()
    }
}

impl<S: Source> Heap<S> {
    /// Walks the block chain without modifying anything.
    pub fn inspect(&self) -> Blocks<'_> {
        Blocks {
            chain: self.region.as_ref().map(|region| region.chain()),
            first: self.region.as_ref().map_or(0, |region| region.first().as_ptr() as usize),
            index: 0,
        }
    }

    /// Sums block sizes and counts over the whole chain.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats::default();

        for block in self.inspect() {
            if block.state.is_allocated() {
                stats.used_bytes += block.size;
                stats.allocated_blocks += 1;
            } else {
                stats.free_bytes += block.size;
                stats.free_blocks += 1;
            }
        }

        stats.total_bytes = stats.used_bytes + stats.free_bytes;
        stats
    }

    /// A [`Display`](fmt::Display)able table of every block.
    pub fn report(&self) -> HeapReport<'_, S> {
        HeapReport { heap: self }
    }
}
