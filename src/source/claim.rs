use core::{num::NonZeroUsize, ptr::NonNull};

use crate::ptr_utils;

use super::{Source, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};

/// Hand a caller-provided buffer to the heap.
///
/// The buffer is claimed once; later reservations fail.
///
/// # Example
/// ```
/// # extern crate tagheap;
/// use tagheap::{Claim, Heap};
///
/// static mut ARENA: [u64; 1024] = [0; 1024];
///
/// let mut heap = Heap::new(unsafe { Claim::array(core::ptr::addr_of_mut!(ARENA)) });
/// heap.init(8192).unwrap();
///
/// let ptr = heap.alloc(100).unwrap();
/// heap.free(ptr.as_ptr()).unwrap();
/// ```
#[derive(Debug)]
pub struct Claim {
    base: *mut u8,
    size: usize,
    page_size: usize,
    claimed: bool,
}

// SAFETY: `Claim` has exclusive access to its buffer
unsafe impl Send for Claim {}

impl Claim {
    /// # Safety
    /// The memory at `base` must be valid for reads and writes of `size` bytes
    /// for as long as the heap using this source exists.
    pub const unsafe fn new(base: *mut u8, size: usize) -> Self {
        Self { base, size, page_size: DEFAULT_PAGE_SIZE, claimed: false }
    }

    /// Claim the memory of an array.
    ///
    /// Use an array of `u64` or a wider type to get the required alignment.
    ///
    /// # Safety
    /// The array must be valid for reads and writes for as long as the heap
    /// using this source exists.
    pub const unsafe fn array<T, const N: usize>(array: *mut [T; N]) -> Self {
        Self::new(array.cast(), N * core::mem::size_of::<T>())
    }

    /// Round region sizes to `page_size` instead of [`DEFAULT_PAGE_SIZE`].
    ///
    /// # Panics
    /// Panics if `page_size` is not a power of two or is less than [`MIN_PAGE_SIZE`].
    pub const fn with_page_size(self, page_size: usize) -> Self {
        assert!(page_size.is_power_of_two() && page_size >= MIN_PAGE_SIZE);

        Self { page_size, ..self }
    }

    /// Whether the buffer has been handed out.
    pub const fn is_claimed(&self) -> bool {
        self.claimed
    }
}

unsafe impl Source for Claim {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve(&mut self, size: NonZeroUsize) -> Option<NonNull<[u8]>> {
        if self.claimed || size.get() > self.size || !ptr_utils::is_aligned_to(self.base, 8) {
            return None;
        }

        let base = NonNull::new(self.base)?;

        // SAFETY: guaranteed by the caller of `new`
        unsafe { base.as_ptr().write_bytes(0, size.get()) };

        self.claimed = true;
        Some(ptr_utils::nonnull_slice_from_raw_parts(base, size.get()))
    }
}
