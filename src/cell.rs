//! [`HeapCell`] allows using a [`Heap`] as a Rust allocator
//! from a single thread, without locking.
//!
//! See [`HeapCell`].

use core::{
    alloc::Layout,
    cell::{RefCell, RefMut},
    ptr::NonNull,
};

use allocator_api2::alloc::{AllocError, Allocator};

use crate::{base::BLOCK_ALIGN, error::Result, ptr_utils, Heap, Source};

/// [`HeapCell`] implements [`Allocator`] through a shared reference,
/// but is [`!Sync`](Sync).
///
/// # Example
/// ```rust
/// # extern crate allocator_api2;
/// # extern crate tagheap;
/// use allocator_api2::vec::Vec;
/// use tagheap::{GlobalAllocSource, HeapCell};
///
/// let heap = HeapCell::new(GlobalAllocSource::new(std::alloc::System));
/// heap.init(4096).unwrap();
///
/// let mut my_vec = Vec::<u32, _>::with_capacity_in(42, &heap);
/// my_vec.push(123);
/// ```
///
/// # Panics
/// Every method borrows the inner [`Heap`] for the duration of the call.
/// Using the [`HeapCell`] while a [`borrow`](HeapCell::borrow) guard is alive,
/// or from within its own [`Source`], panics.
#[derive(Debug)]
pub struct HeapCell<S: Source> {
    cell: RefCell<Heap<S>>,
}

impl<S: Source> HeapCell<S> {
    /// Create a new, uninitialized [`HeapCell`].
    #[inline]
    pub const fn new(source: S) -> Self {
        Self { cell: RefCell::new(Heap::new(source)) }
    }

    /// See [`Heap::init`].
    #[track_caller]
    pub fn init(&self, region_size: usize) -> Result<()> {
        self.cell.borrow_mut().init(region_size)
    }

    /// See [`Heap::alloc`].
    #[track_caller]
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.cell.borrow_mut().alloc(size)
    }

    /// See [`Heap::free`].
    #[track_caller]
    pub fn free(&self, ptr: *mut u8) -> Result<()> {
        self.cell.borrow_mut().free(ptr)
    }

    /// Borrow the inner [`Heap`], e.g. to [`inspect`](Heap::inspect) it.
    #[track_caller]
    pub fn borrow(&self) -> RefMut<'_, Heap<S>> {
        self.cell.borrow_mut()
    }

    /// Returns a mutable reference to the inner [`Heap`].
    #[inline]
    pub fn get_mut(&mut self) -> &mut Heap<S> {
        self.cell.get_mut()
    }

    /// Consumes the [`HeapCell`], returning the inner [`Heap`].
    #[inline]
    pub fn into_inner(self) -> Heap<S> {
        self.cell.into_inner()
    }
}

unsafe impl<S: Source> Allocator for HeapCell<S> {
    #[track_caller]
    fn allocate(&self, layout: Layout) -> core::result::Result<NonNull<[u8]>, AllocError> {
        if layout.align() > BLOCK_ALIGN {
            return Err(AllocError);
        }

        if layout.size() == 0 {
            return Ok(ptr_utils::nonnull_slice_from_raw_parts(ptr_utils::dangling(layout), 0));
        }

        self.alloc(layout.size())
            .map(|nn| ptr_utils::nonnull_slice_from_raw_parts(nn, layout.size()))
            .ok_or(AllocError)
    }

    #[track_caller]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            let result = self.free(ptr.as_ptr());
            debug_assert!(result.is_ok(), "deallocate({:p}) failed: {:?}", ptr, result);
        }
    }
}
