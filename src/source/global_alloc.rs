use core::{
    alloc::{GlobalAlloc, Layout},
    fmt::Debug,
    num::NonZeroUsize,
    ptr::NonNull,
};

use crate::ptr_utils;

use super::{Source, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};

/// Source the region from a backing allocator, such as `std::alloc::System`.
///
/// The region is aligned to the page size and given back to the allocator
/// when the heap is dropped.
///
/// # Example
///
/// ```
/// # extern crate tagheap;
/// use tagheap::{GlobalAllocSource, Heap};
///
/// let mut heap = Heap::new(GlobalAllocSource::new(std::alloc::System));
/// heap.init(1 << 16).unwrap();
/// assert!(heap.alloc(1000).is_some());
/// ```
#[derive(Debug)]
pub struct GlobalAllocSource<G: GlobalAlloc> {
    allocator: G,
    page_size: usize,
}

impl<G: GlobalAlloc> GlobalAllocSource<G> {
    /// Create a new [`GlobalAllocSource`] with the given allocator and
    /// a page size of [`DEFAULT_PAGE_SIZE`].
    pub const fn new(allocator: G) -> Self {
        Self { allocator, page_size: DEFAULT_PAGE_SIZE }
    }

    /// Create a new [`GlobalAllocSource`] with the given allocator and power-of-two page size.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is not a power of two or is less than [`MIN_PAGE_SIZE`].
    pub const fn with_page_size(allocator: G, page_size: usize) -> Self {
        assert!(page_size.is_power_of_two() && page_size >= MIN_PAGE_SIZE);

        Self { allocator, page_size }
    }
}

unsafe impl<G: GlobalAlloc + Debug> Source for GlobalAllocSource<G> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve(&mut self, size: NonZeroUsize) -> Option<NonNull<[u8]>> {
        let layout = Layout::from_size_align(size.get(), self.page_size).ok()?;

        // SAFETY: the layout has a nonzero size
        let base = NonNull::new(unsafe { self.allocator.alloc_zeroed(layout) })?;

        Some(ptr_utils::nonnull_slice_from_raw_parts(base, size.get()))
    }

    unsafe fn release(&mut self, region: NonNull<[u8]>) {
        // SAFETY: this layout was valid when the region was reserved
        let layout = Layout::from_size_align_unchecked(region.len(), self.page_size);

        self.allocator.dealloc(region.cast().as_ptr(), layout);
    }
}
