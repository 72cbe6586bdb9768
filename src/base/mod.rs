//! The core heap: region setup, best-fit allocation, splitting, and
//! freeing with immediate coalescing.

#[cfg(feature = "counters")]
pub mod counters;
mod region;
mod tag;
pub mod walk;

use core::num::NonZeroUsize;
use core::ptr::NonNull;

use crate::error::{HeapError, Result};
use crate::ptr_utils;
use crate::source::Source;

use region::Region;
use tag::Tag;

/// The size of a block header or footer.
pub const TAG_SIZE: usize = core::mem::size_of::<Tag>();

/// Every block size is a multiple of this, and every payload is aligned to it.
pub const BLOCK_ALIGN: usize = 8;

/// The smallest block the heap hands out: a header and 4 bytes of payload.
pub const MIN_BLOCK_SIZE: usize = 8;

/// A free block is only split off if it's at least this big:
/// header, footer, and 8 bytes of payload.
pub const MIN_SPLIT_SIZE: usize = 16;

/// Bytes of each region not available to blocks: the leading pad that aligns
/// payloads, and the trailing end marker.
pub const REGION_OVERHEAD: usize = 8;

/// A single-region, best-fit, boundary-tag heap.
///
/// The heap gets its memory from a [`Source`] exactly once, in [`init`](Heap::init),
/// and keeps all of its bookkeeping in the region itself: every block starts
/// with a 4-byte header, and every free block ends with a 4-byte footer.
///
/// [`Heap`] requires `&mut self` to allocate and free. To use it through a
/// shared reference, wrap it in a [`HeapCell`](crate::HeapCell)
/// (single-threaded) or a [`HeapLock`](crate::HeapLock).
///
/// The region is handed back to the source when the heap is dropped.
#[derive(Debug)]
pub struct Heap<S: Source> {
    #[cfg(feature = "counters")]
    /// Allocation statistics for this heap.
    counters: counters::Counters,

    region: Option<Region>,

    /// [`Heap`] only calls into it while initializing and when dropped.
    source: S,
}

// SAFETY: the heap exclusively owns its region; nothing in it is tied to a thread
unsafe impl<S: Source + Send> Send for Heap<S> {}

impl<S: Source> Heap<S> {
    /// Creates an uninitialized heap. Call [`init`](Heap::init) before allocating.
    pub const fn new(source: S) -> Self {
        Self {
            #[cfg(feature = "counters")]
            counters: counters::Counters::new(),
            region: None,
            source,
        }
    }

    /// The memory source.
    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The memory source, while the heap has no region yet.
    ///
    /// Once initialized, the source must stay the one the region is
    /// released to, so this returns `None`.
    #[inline]
    pub fn source_mut(&mut self) -> Option<&mut S> {
        match self.region {
            Some(_) => None,
            None => Some(&mut self.source),
        }
    }

    /// Returns whether [`init`](Heap::init) has succeeded on this heap.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.region.is_some()
    }

    /// The bytes from the first header to the end marker, or zero before initialization.
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.region.as_ref().map_or(0, Region::usable)
    }

    /// The whole region reserved from the source, if initialized.
    #[inline]
    pub fn region(&self) -> Option<NonNull<[u8]>> {
        self.region.as_ref().map(Region::mapping)
    }

    /// Returns the block size needed to hold `payload` bytes,
    /// or `None` if it isn't representable.
    pub const fn required_block_size(payload: usize) -> Option<usize> {
        let with_header = match payload.checked_add(TAG_SIZE) {
            Some(size) => size,
            None => return None,
        };

        match ptr_utils::round_up_to(with_header, BLOCK_ALIGN) {
            Some(size) if size < MIN_BLOCK_SIZE => Some(MIN_BLOCK_SIZE),
            Some(size) => Some(size),
            None => None,
        }
    }

    /// Reserves the heap region and lays it out as a single free block.
    ///
    /// `region_size` is rounded up to the source's page size, of which
    /// [`REGION_OVERHEAD`] bytes go to alignment and the end marker.
    ///
    /// # Errors
    /// - [`HeapError::AlreadyInitialized`] if the heap already has a region.
    /// - [`HeapError::InvalidSize`] if `region_size` is zero, or too large once rounded.
    /// - [`HeapError::RegionUnavailable`] if the source cannot provide the memory.
    pub fn init(&mut self, region_size: usize) -> Result<()> {
        if self.region.is_some() {
            debug!("init({}) on an initialized heap", region_size);
            return Err(HeapError::AlreadyInitialized);
        }

        let page_size = self.source.page_size();
        debug_assert!(page_size.is_power_of_two() && page_size >= crate::source::MIN_PAGE_SIZE);

        let rounded = match NonZeroUsize::new(region_size)
            .and_then(|size| ptr_utils::round_up_to(size.get(), page_size))
            .and_then(NonZeroUsize::new)
        {
            Some(rounded) => rounded,
            None => {
                debug!("init({}): invalid region size", region_size);
                return Err(HeapError::InvalidSize);
            }
        };

        match rounded.get().checked_sub(REGION_OVERHEAD) {
            Some(usable) if usable >= MIN_BLOCK_SIZE && usable <= Tag::MAX_SIZE => {}
            _ => {
                debug!("init({}): {} bytes can't be tagged", region_size, rounded);
                return Err(HeapError::InvalidSize);
            }
        }

        let Some(mapping) = self.source.reserve(rounded) else {
            debug!("init({}): source could not reserve {} bytes", region_size, rounded);
            return Err(HeapError::RegionUnavailable);
        };

        if mapping.len() < rounded.get()
            || !ptr_utils::is_aligned_to(mapping.cast::<u8>().as_ptr(), BLOCK_ALIGN)
        {
            debug!("init({}): source returned an unusable region {:p}", region_size, mapping);
            // SAFETY: `mapping` was just reserved from this source and is unused
            unsafe { self.source.release(mapping) };
            return Err(HeapError::RegionUnavailable);
        }

        // SAFETY: the source guarantees `mapping` is ours, writable, and zeroed,
        // and we checked its length and alignment above
        let region = unsafe { Region::format(mapping, rounded.get()) };

        debug!(
            "init({}): region {:p}, {} bytes reserved, {} usable",
            region_size,
            mapping.cast::<u8>(),
            rounded,
            region.usable()
        );

        #[cfg(feature = "counters")]
        self.counters.account_init(region.usable());

        self.region = Some(region);
        self.scan_for_errors();

        Ok(())
    }

    /// Allocates a block with room for `size` bytes of payload.
    ///
    /// Returns `None` if `size` is zero, the heap is uninitialized, or no free
    /// block is large enough. See [`try_alloc`](Heap::try_alloc) to tell these apart.
    ///
    /// The returned pointer is 8-byte aligned and valid for reads and writes
    /// of `size` bytes until it's passed to [`free`](Heap::free).
    #[inline]
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.try_alloc(size).ok()
    }

    /// Allocates a block with room for `size` bytes of payload.
    ///
    /// The smallest free block that fits is chosen, the lowest one in case of a tie.
    /// It's split if the leftover is at least [`MIN_SPLIT_SIZE`] bytes.
    ///
    /// # Errors
    /// - [`HeapError::Uninitialized`] if [`init`](Heap::init) hasn't succeeded.
    /// - [`HeapError::InvalidSize`] if `size` is zero.
    /// - [`HeapError::CapacityExhausted`] if no free block is large enough.
    pub fn try_alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        let Some(region) = self.region.as_mut() else {
            return Err(HeapError::Uninitialized);
        };

        if size == 0 {
            return Err(HeapError::InvalidSize);
        }

        let Some(needed) = Self::required_block_size(size) else {
            trace!("alloc({}): too large", size);
            return Err(HeapError::CapacityExhausted);
        };

        let Some((offset, tag)) = best_fit(region, needed) else {
            trace!("alloc({}): no free block of {} bytes", size, needed);
            return Err(HeapError::CapacityExhausted);
        };

        #[cfg(feature = "counters")]
        self.counters.account_deregister_gap(tag.size());

        let (ptr, remainder) = place(region, offset, tag, needed);

        #[cfg(feature = "counters")]
        {
            self.counters.account_alloc(tag.size() - remainder.unwrap_or(0));
            if let Some(remainder) = remainder {
                self.counters.account_register_gap(remainder);
            }
        }

        trace!(
            "alloc({}): {} bytes at offset {:#x} from a {} byte block{}",
            size,
            tag.size() - remainder.unwrap_or(0),
            offset,
            tag.size(),
            if remainder.is_some() { ", split" } else { "" }
        );

        self.scan_for_errors();

        Ok(ptr)
    }

    /// Frees the block whose payload starts at `ptr`, merging it with
    /// free neighbors.
    ///
    /// Nothing is modified if an error is returned.
    ///
    /// # Errors
    /// Checked in this order:
    /// - [`HeapError::NullPointer`] if `ptr` is null.
    /// - [`HeapError::Uninitialized`] if [`init`](Heap::init) hasn't succeeded.
    /// - [`HeapError::OutOfBounds`] if `ptr` isn't a payload address within the region.
    /// - [`HeapError::Misaligned`] if `ptr` isn't 8-byte aligned.
    /// - [`HeapError::DoubleFree`] if `ptr` isn't the payload of an allocated block,
    ///     because it was freed already or was never returned by an allocation.
    pub fn free(&mut self, ptr: *mut u8) -> Result<()> {
        let (offset, tag) = match self.validate(ptr) {
            Ok(block) => block,
            Err(err) => {
                debug!("free({:p}) rejected: {}", ptr, err);
                return Err(err);
            }
        };

        // `validate` succeeded, so the region exists
        let Some(region) = self.region.as_mut() else {
            return Err(HeapError::Uninitialized);
        };

        #[cfg(feature = "counters")]
        self.counters.account_dealloc(tag.size());

        let mut base = offset;
        let mut size = tag.size();

        let freed = tag.with_allocated(false);
        region.set_tag(offset, freed);
        region.set_footer(offset, size);

        let next = offset + size;
        let mut merged_next = false;
        let next_tag = region.tag(next);

        if !next_tag.is_end() {
            let next_tag = next_tag.with_prev_allocated(false);
            region.set_tag(next, next_tag);

            if !next_tag.is_allocated() {
                #[cfg(feature = "counters")]
                self.counters.account_deregister_gap(next_tag.size());

                size += next_tag.size();
                region.set_tag(offset, freed.with_size(size));
                region.set_footer(offset, size);
                merged_next = true;
            }
        }

        let merged_prev = !tag.is_prev_allocated();

        if merged_prev {
            let prev_size = region.footer(offset);
            base = offset - prev_size;

            let prev_tag = region.tag(base);
            debug_assert!(!prev_tag.is_allocated());
            debug_assert_eq!(prev_tag.size(), prev_size);

            #[cfg(feature = "counters")]
            self.counters.account_deregister_gap(prev_size);

            size += prev_size;
            region.set_tag(base, prev_tag.with_size(size));
            region.set_footer(base, size);
        }

        #[cfg(feature = "counters")]
        self.counters.account_register_gap(size);

        trace!(
            "free({:p}): block at offset {:#x}, merged {}, now {} free bytes at {:#x}",
            ptr,
            offset,
            match (merged_prev, merged_next) {
                (true, true) => "both ways",
                (true, false) => "backward",
                (false, true) => "forward",
                (false, false) => "none",
            },
            size,
            base
        );

        self.scan_for_errors();

        Ok(())
    }

    /// Finds the offset and header of the allocated block whose payload is `ptr`.
    fn validate(&self, ptr: *mut u8) -> Result<(usize, Tag)> {
        if ptr.is_null() {
            return Err(HeapError::NullPointer);
        }

        let region = self.region.as_ref().ok_or(HeapError::Uninitialized)?;
        let offset = region.payload_offset(ptr)?;

        match region.block_at(offset) {
            Some(tag) if tag.is_allocated() => Ok((offset, tag)),
            _ => Err(HeapError::DoubleFree),
        }
    }

    /// Debugging function for checking every heap invariant.
    ///
    /// Panics on any inconsistency.
    #[cfg(any(test, feature = "error-scanning"))]
    #[track_caller]
    pub fn scan_for_errors(&self) {
        let Some(region) = &self.region else { return };

        let mut walked = 0;
        let mut prev_allocated = true;

        #[cfg(feature = "counters")]
        let (mut allocated_count, mut allocated_bytes, mut free_count, mut free_bytes) = (0, 0, 0, 0);

        for (offset, tag) in region.chain() {
            assert_eq!(offset, walked, "chain skipped from {:#x} to {:#x}", walked, offset);

            let size = tag.size();
            assert!(size >= MIN_BLOCK_SIZE && size % BLOCK_ALIGN == 0, "bad size {:?} at {:#x}", tag, offset);
            assert_eq!(
                tag.is_prev_allocated(),
                prev_allocated,
                "stale prev-allocated flag {:?} at {:#x}",
                tag,
                offset
            );

            if tag.is_allocated() {
                #[cfg(feature = "counters")]
                {
                    allocated_count += 1;
                    allocated_bytes += size;
                }
            } else {
                assert!(prev_allocated, "uncoalesced free blocks at {:#x}", offset);
                assert_eq!(region.footer(offset + size), size, "footer mismatch {:?} at {:#x}", tag, offset);

                #[cfg(feature = "counters")]
                {
                    free_count += 1;
                    free_bytes += size;
                }
            }

            prev_allocated = tag.is_allocated();
            walked += size;
        }

        assert_eq!(walked, region.usable(), "chain doesn't tile the region");
        assert!(region.tag(walked).is_end(), "missing end marker at {:#x}", walked);

        #[cfg(feature = "counters")]
        {
            assert_eq!(self.counters.allocation_count, allocated_count);
            assert_eq!(self.counters.allocated_bytes, allocated_bytes);
            assert_eq!(self.counters.fragment_count, free_count);
            assert_eq!(self.counters.available_bytes, free_bytes);
            assert_eq!(self.counters.region_bytes, region.usable());
        }
    }

    #[cfg(not(any(test, feature = "error-scanning")))]
    #[inline(always)]
    fn scan_for_errors(&self) {}
}

impl<S: Source> Drop for Heap<S> {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            // SAFETY: the region came from this source and the heap is going away
            unsafe { self.source.release(region.mapping()) }
        }
    }
}

/// Returns the smallest free block of at least `needed` bytes, the lowest one on a tie.
fn best_fit(region: &Region, needed: usize) -> Option<(usize, Tag)> {
    let mut best: Option<(usize, Tag)> = None;

    for (offset, tag) in region.chain() {
        if tag.is_allocated() || tag.size() < needed {
            continue;
        }

        if best.map_or(true, |(_, best_tag)| tag.size() < best_tag.size()) {
            best = Some((offset, tag));

            if tag.size() == needed {
                break;
            }
        }
    }

    best
}

/// Marks the free block at `offset` allocated, splitting off the leftover
/// if it's big enough to stand as a free block.
///
/// Returns the payload pointer and the size of the split-off remainder, if any.
fn place(region: &mut Region, offset: usize, tag: Tag, needed: usize) -> (NonNull<u8>, Option<usize>) {
    debug_assert!(!tag.is_allocated() && tag.size() >= needed);

    let leftover = tag.size() - needed;

    if leftover >= MIN_SPLIT_SIZE {
        region.set_tag(offset, tag.with_size(needed).with_allocated(true));

        // the block after the remainder already knows its predecessor is free
        let remainder = offset + needed;
        region.set_tag(remainder, Tag::new(leftover, false, true));
        region.set_footer(remainder, leftover);

        (region.payload(offset), Some(leftover))
    } else {
        region.set_tag(offset, tag.with_allocated(true));

        let next = offset + tag.size();
        let next_tag = region.tag(next);
        if !next_tag.is_end() {
            region.set_tag(next, next_tag.with_prev_allocated(true));
        }

        (region.payload(offset), None)
    }
}

#[cfg(test)]
mod tests {
    use std::alloc::System;

    use test_log::test;

    use super::walk::{BlockDescriptor, BlockState};
    use super::*;
    use crate::{Claim, GlobalAllocSource};

    type TestHeap = Heap<GlobalAllocSource<System>>;

    fn heap_of(size: usize) -> TestHeap {
        let mut heap = Heap::new(GlobalAllocSource::new(System));
        heap.init(size).unwrap();
        heap
    }

    fn blocks(heap: &TestHeap) -> Vec<BlockDescriptor> {
        heap.inspect().collect()
    }

    /// (size, state) of each block, in address order.
    fn layout(heap: &TestHeap) -> Vec<(usize, BlockState)> {
        heap.inspect().map(|b| (b.size, b.state)).collect()
    }

    fn region_base(heap: &TestHeap) -> usize {
        heap.region().unwrap().cast::<u8>().as_ptr() as usize
    }

    #[derive(Debug)]
    struct Unavailable;

    unsafe impl Source for Unavailable {
        fn page_size(&self) -> usize {
            4096
        }

        fn reserve(&mut self, _size: NonZeroUsize) -> Option<NonNull<[u8]>> {
            None
        }
    }

    #[test]
    fn required_block_size_test() {
        assert_eq!(TestHeap::required_block_size(1), Some(8));
        assert_eq!(TestHeap::required_block_size(4), Some(8));
        assert_eq!(TestHeap::required_block_size(5), Some(16));
        assert_eq!(TestHeap::required_block_size(20), Some(24));
        assert_eq!(TestHeap::required_block_size(50), Some(56));
        assert_eq!(TestHeap::required_block_size(100), Some(104));
        assert_eq!(TestHeap::required_block_size(usize::MAX), None);
        assert_eq!(TestHeap::required_block_size(usize::MAX - 4), None);
    }

    #[test]
    fn init_test() {
        let heap = heap_of(1024);

        assert!(heap.is_initialized());
        assert_eq!(heap.region().unwrap().len(), 4096);
        assert_eq!(heap.usable_size(), 4096 - REGION_OVERHEAD);

        let region = heap.region.as_ref().unwrap();
        let first = region.tag(0);
        assert_eq!(first.size(), 4088);
        assert!(!first.is_allocated());
        assert!(first.is_prev_allocated());
        assert_eq!(region.footer(4088), 4088);
        assert_eq!(region.tag(4088).into_raw(), 1);

        let base = region_base(&heap);
        assert_eq!(
            blocks(&heap),
            [BlockDescriptor {
                index: 1,
                offset: 0,
                state: BlockState::Free,
                prev_state: BlockState::Allocated,
                start: base + TAG_SIZE,
                end: base + TAG_SIZE + 4088 - 1,
                size: 4088,
            }]
        );
    }

    #[test]
    fn init_rounds_to_page_size() {
        assert_eq!(heap_of(1).usable_size(), 4088);
        assert_eq!(heap_of(4096).usable_size(), 4088);
        assert_eq!(heap_of(4097).usable_size(), 8192 - REGION_OVERHEAD);

        let mut heap = Heap::new(GlobalAllocSource::with_page_size(System, 64));
        heap.init(100).unwrap();
        assert_eq!(heap.usable_size(), 128 - REGION_OVERHEAD);
    }

    #[test]
    fn init_errors() {
        let mut heap = Heap::new(GlobalAllocSource::new(System));

        assert_eq!(heap.init(0), Err(HeapError::InvalidSize));
        assert_eq!(heap.init(usize::MAX), Err(HeapError::InvalidSize));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(heap.init(1 << 33), Err(HeapError::InvalidSize));
        assert!(!heap.is_initialized());

        heap.init(1024).unwrap();

        // the initialization check comes first
        assert_eq!(heap.init(0), Err(HeapError::AlreadyInitialized));
        assert_eq!(heap.init(1024), Err(HeapError::AlreadyInitialized));
        assert_eq!(heap.usable_size(), 4088);

        let mut heap = Heap::new(Unavailable);
        assert_eq!(heap.init(1024), Err(HeapError::RegionUnavailable));
        assert!(!heap.is_initialized());
    }

    #[test]
    fn region_too_small_for_source() {
        let mut buffer = vec![0u64; 64];
        let mut heap = Heap::new(unsafe { Claim::new(buffer.as_mut_ptr().cast(), 512) });

        // a page is 4096 bytes, more than the claim holds
        assert_eq!(heap.init(100), Err(HeapError::RegionUnavailable));
        assert!(!heap.is_initialized());
    }

    #[test]
    fn uninitialized_test() {
        let mut heap = Heap::new(GlobalAllocSource::new(System));

        assert_eq!(heap.alloc(8), None);
        assert_eq!(heap.try_alloc(8), Err(HeapError::Uninitialized));
        assert_eq!(heap.free(8 as *mut u8), Err(HeapError::Uninitialized));
        assert_eq!(heap.free(core::ptr::null_mut()), Err(HeapError::NullPointer));
        assert_eq!(heap.usable_size(), 0);
        assert_eq!(heap.inspect().count(), 0);
    }

    #[test]
    fn alloc_zero_test() {
        let mut heap = heap_of(1024);
        let a = heap.alloc(24).unwrap();

        let before = blocks(&heap);
        assert_eq!(heap.alloc(0), None);
        assert_eq!(heap.try_alloc(0), Err(HeapError::InvalidSize));
        assert_eq!(blocks(&heap), before);

        heap.free(a.as_ptr()).unwrap();
    }

    #[test]
    fn alloc_is_aligned_and_in_bounds() {
        let mut heap = heap_of(8192);
        let base = region_base(&heap);
        let end = base + heap.region().unwrap().len();

        for size in 1..100 {
            let ptr = heap.alloc(size).unwrap();
            let addr = ptr.as_ptr() as usize;

            assert_eq!(addr % BLOCK_ALIGN, 0);
            assert!(addr > base && addr + size <= end - TAG_SIZE);
        }
    }

    #[test]
    fn scenario_test() {
        let mut heap = heap_of(1024);

        let a = heap.alloc(100).unwrap();
        let b = heap.alloc(50).unwrap();

        assert_eq!(
            layout(&heap),
            [(104, BlockState::Allocated), (56, BlockState::Allocated), (4088 - 160, BlockState::Free)]
        );
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 104);

        heap.free(a.as_ptr()).unwrap();

        assert_eq!(
            layout(&heap),
            [(104, BlockState::Free), (56, BlockState::Allocated), (4088 - 160, BlockState::Free)]
        );
        assert_eq!(blocks(&heap)[1].prev_state, BlockState::Free);

        heap.free(b.as_ptr()).unwrap();

        assert_eq!(layout(&heap), [(4088, BlockState::Free)]);
        assert_eq!(blocks(&heap)[0].prev_state, BlockState::Allocated);
    }

    /// Carves out free blocks of the given sizes, each followed by an
    /// allocated 8-byte fence, and returns the payloads of the free blocks.
    fn carve(heap: &mut TestHeap, sizes: &[usize]) -> Vec<NonNull<u8>> {
        let mut holes = Vec::new();

        for &size in sizes {
            holes.push(heap.alloc(size - TAG_SIZE).unwrap());
            heap.alloc(4).unwrap();
        }

        for hole in &holes {
            heap.free(hole.as_ptr()).unwrap();
        }

        holes
    }

    #[test]
    fn best_fit_prefers_smallest() {
        let mut heap = heap_of(1024);
        let holes = carve(&mut heap, &[40, 24, 64]);

        let ptr = heap.alloc(20).unwrap();
        assert_eq!(ptr, holes[1]);

        let block = heap.inspect().find(|b| b.payload() == ptr.as_ptr() as usize).unwrap();
        assert_eq!(block.size, 24);
        assert_eq!(block.state, BlockState::Allocated);
    }

    #[test]
    fn best_fit_without_split() {
        let mut heap = heap_of(1024);
        let holes = carve(&mut heap, &[40, 64]);

        // needs 32: the 40-byte block wins and leftover 8 is kept
        let ptr = heap.alloc(28).unwrap();
        assert_eq!(ptr, holes[0]);

        let all = blocks(&heap);
        assert_eq!(all[0].size, 40);
        assert_eq!(all[0].state, BlockState::Allocated);
        assert_eq!(all[1].prev_state, BlockState::Allocated);
        assert_eq!(all[2].size, 64);
        assert_eq!(all[2].state, BlockState::Free);
    }

    #[test]
    fn split_at_exact_threshold() {
        let mut heap = heap_of(1024);
        let holes = carve(&mut heap, &[40]);

        // needs 24: leftover 16 is just enough for a free block
        let ptr = heap.alloc(20).unwrap();
        assert_eq!(ptr, holes[0]);

        let all = blocks(&heap);
        assert_eq!(all[0].size, 24);
        assert_eq!(all[0].state, BlockState::Allocated);
        assert_eq!(all[1].size, MIN_SPLIT_SIZE);
        assert_eq!(all[1].state, BlockState::Free);
        assert_eq!(all[1].prev_state, BlockState::Allocated);
        assert_eq!(all[2].size, 8);
        assert_eq!(all[2].prev_state, BlockState::Free);
    }

    #[test]
    fn best_fit_splits_large_leftover() {
        let mut heap = heap_of(1024);
        let holes = carve(&mut heap, &[64, 200]);

        let ptr = heap.alloc(20).unwrap();
        assert_eq!(ptr, holes[0]);

        assert_eq!(
            layout(&heap)[..3],
            [(24, BlockState::Allocated), (40, BlockState::Free), (8, BlockState::Allocated)]
        );
        assert_eq!(blocks(&heap)[1].prev_state, BlockState::Allocated);
    }

    #[test]
    fn best_fit_tie_takes_lowest() {
        let mut heap = heap_of(1024);
        let holes = carve(&mut heap, &[48, 32, 48]);

        assert_eq!(heap.alloc(40).unwrap(), holes[0]);
        assert_eq!(heap.alloc(40).unwrap(), holes[2]);
    }

    #[test]
    fn exact_fill_test() {
        let mut heap = heap_of(1024);

        let all = heap.alloc(4088 - TAG_SIZE).unwrap();
        assert_eq!(layout(&heap), [(4088, BlockState::Allocated)]);
        assert_eq!(heap.alloc(1), None);
        assert_eq!(heap.try_alloc(1), Err(HeapError::CapacityExhausted));

        heap.free(all.as_ptr()).unwrap();
        assert_eq!(layout(&heap), [(4088, BlockState::Free)]);

        assert_eq!(heap.try_alloc(4088), Err(HeapError::CapacityExhausted));
        assert_eq!(heap.try_alloc(usize::MAX), Err(HeapError::CapacityExhausted));
        assert_eq!(layout(&heap), [(4088, BlockState::Free)]);
    }

    #[test]
    fn coalesce_test() {
        let mut heap = heap_of(1024);

        let a = heap.alloc(12).unwrap();
        let b = heap.alloc(12).unwrap();
        let c = heap.alloc(12).unwrap();
        let d = heap.alloc(12).unwrap();
        let tail = 4088 - 64;

        // no free neighbors
        heap.free(b.as_ptr()).unwrap();
        assert_eq!(
            layout(&heap),
            [
                (16, BlockState::Allocated),
                (16, BlockState::Free),
                (16, BlockState::Allocated),
                (16, BlockState::Allocated),
                (tail, BlockState::Free)
            ]
        );

        // backward only
        heap.free(c.as_ptr()).unwrap();
        assert_eq!(
            layout(&heap),
            [(16, BlockState::Allocated), (32, BlockState::Free), (16, BlockState::Allocated), (tail, BlockState::Free)]
        );

        // forward only
        heap.free(a.as_ptr()).unwrap();
        assert_eq!(layout(&heap), [(48, BlockState::Free), (16, BlockState::Allocated), (tail, BlockState::Free)]);
        assert_eq!(blocks(&heap)[0].prev_state, BlockState::Allocated);

        // both ways
        heap.free(d.as_ptr()).unwrap();
        assert_eq!(layout(&heap), [(4088, BlockState::Free)]);
    }

    #[test]
    fn free_errors() {
        let mut heap = heap_of(1024);

        let a = heap.alloc(64).unwrap();
        let b = heap.alloc(8).unwrap();
        let before = blocks(&heap);

        let mut local = 0u64;
        let base = region_base(&heap);

        assert_eq!(heap.free(core::ptr::null_mut()), Err(HeapError::NullPointer));
        assert_eq!(heap.free(core::ptr::addr_of_mut!(local).cast()), Err(HeapError::OutOfBounds));
        // a header address is below its payload
        assert_eq!(heap.free((base + TAG_SIZE) as *mut u8), Err(HeapError::OutOfBounds));
        // the end marker's would-be payload
        assert_eq!(heap.free((base + 4096) as *mut u8), Err(HeapError::OutOfBounds));
        assert_eq!(heap.free(a.as_ptr().wrapping_add(4)), Err(HeapError::Misaligned));
        assert_eq!(heap.free(a.as_ptr().wrapping_add(1)), Err(HeapError::Misaligned));
        // interior of an allocated block
        assert_eq!(heap.free(a.as_ptr().wrapping_add(16)), Err(HeapError::DoubleFree));
        // free remainder
        assert_eq!(heap.free(b.as_ptr().wrapping_add(16)), Err(HeapError::DoubleFree));

        assert_eq!(blocks(&heap), before);

        heap.free(a.as_ptr()).unwrap();
        let after = blocks(&heap);
        assert_eq!(heap.free(a.as_ptr()), Err(HeapError::DoubleFree));
        assert_eq!(blocks(&heap), after);

        heap.free(b.as_ptr()).unwrap();
        assert_eq!(heap.free(b.as_ptr()), Err(HeapError::DoubleFree));
        assert_eq!(layout(&heap), [(4088, BlockState::Free)]);
    }

    #[test]
    fn round_trip_test() {
        let mut heap = heap_of(1024);
        let _keep = heap.alloc(30).unwrap();

        let before = heap.stats();
        let ptr = heap.alloc(200).unwrap();
        assert_eq!(heap.stats().allocated_blocks, before.allocated_blocks + 1);

        heap.free(ptr.as_ptr()).unwrap();
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn random_actions() {
        let mut heap = heap_of(1 << 16);
        let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

        for _ in 0..20000 {
            if live.is_empty() || fastrand::u8(..) < 150 {
                let size = match fastrand::u8(..4) {
                    0 => fastrand::usize(1..16),
                    1 | 2 => fastrand::usize(1..256),
                    _ => fastrand::usize(1..4096),
                };

                if let Some(ptr) = heap.alloc(size) {
                    let fill = fastrand::u8(..);
                    unsafe { ptr.as_ptr().write_bytes(fill, size) };
                    live.push((ptr, size, fill));
                }
            } else {
                let (ptr, size, fill) = live.swap_remove(fastrand::usize(..live.len()));

                let payload = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), size) };
                assert!(payload.iter().all(|&byte| byte == fill), "payload clobbered");

                heap.free(ptr.as_ptr()).unwrap();
            }
        }

        for (ptr, _, _) in live.drain(..) {
            heap.free(ptr.as_ptr()).unwrap();
        }

        assert_eq!(layout(&heap), [(heap.usable_size(), BlockState::Free)]);
    }

    #[test]
    fn independent_heaps() {
        let mut a = heap_of(1024);
        let mut b = heap_of(1024);

        let pa = a.alloc(16).unwrap();
        let pb = b.alloc(16).unwrap();

        assert_eq!(a.free(pb.as_ptr()), Err(HeapError::OutOfBounds));
        assert_eq!(b.free(pa.as_ptr()), Err(HeapError::OutOfBounds));

        a.free(pa.as_ptr()).unwrap();
        b.free(pb.as_ptr()).unwrap();
    }
}
