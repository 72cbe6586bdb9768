//! [`HeapLock`] facilitates using a [`Heap`] as a Rust global allocator,
//! or other usage across multiple threads.
//!
//! See [`HeapLock`].

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::{null_mut, NonNull},
};

use allocator_api2::alloc::{AllocError, Allocator};

use crate::{base::BLOCK_ALIGN, error::Result, ptr_utils, Heap, Source};

/// Wraps a mutex-locked [`Heap`].
///
/// Every allocation and free holds the lock for the whole operation,
/// search, split, and coalescing included.
///
/// # Example
/// ```rust
/// # extern crate tagheap;
/// use spin::Mutex;
/// use tagheap::{GlobalAllocSource, HeapLock};
///
/// let heap = HeapLock::<Mutex<()>, _>::new(GlobalAllocSource::new(std::alloc::System));
/// heap.init(1 << 16).unwrap();
///
/// let ptr = heap.lock().alloc(100).unwrap();
/// heap.lock().free(ptr.as_ptr()).unwrap();
/// ```
///
/// As a global allocator, the region must be initialized before the first allocation:
/// ```rust,ignore
/// #[global_allocator]
/// static HEAP: HeapLock<spin::Mutex<()>, tagheap::Os> = HeapLock::new(tagheap::Os);
///
/// fn main() {
///     HEAP.init(1 << 24).unwrap();
///     // ...
/// }
/// ```
///
/// # Logging
///
/// The heap runs with the lock held. Nothing in the heap calls out while
/// locked unless the `logging` feature is on, in which case every operation
/// reaches the installed logger. A logger that allocates through this same
/// [`HeapLock`] then spins on the lock forever, so keep `logging` off for a
/// global allocator or use a logger that never allocates.
#[derive(Debug)]
pub struct HeapLock<R: lock_api::RawMutex, S: Source> {
    mutex: lock_api::Mutex<R, Heap<S>>,
}

impl<R: lock_api::RawMutex, S: Source> HeapLock<R, S> {
    /// Create a new, uninitialized [`HeapLock`].
    pub const fn new(source: S) -> Self {
        Self { mutex: lock_api::Mutex::new(Heap::new(source)) }
    }

    /// Lock the mutex and access the inner [`Heap`].
    #[track_caller]
    pub fn lock(&self) -> lock_api::MutexGuard<'_, R, Heap<S>> {
        self.mutex.lock()
    }

    /// Try to lock the mutex and access the inner [`Heap`].
    pub fn try_lock(&self) -> Option<lock_api::MutexGuard<'_, R, Heap<S>>> {
        self.mutex.try_lock()
    }

    /// See [`Heap::init`].
    pub fn init(&self, region_size: usize) -> Result<()> {
        self.lock().init(region_size)
    }

    /// Returns a mutable reference to the inner [`Heap`].
    ///
    /// This avoids locking, as having a mutable reference statically
    /// guarantees that `self` is not locked.
    pub fn get_mut(&mut self) -> &mut Heap<S> {
        self.mutex.get_mut()
    }

    /// Retrieve the inner [`Heap`].
    pub fn into_inner(self) -> Heap<S> {
        self.mutex.into_inner()
    }
}

unsafe impl<R: lock_api::RawMutex, S: Source> GlobalAlloc for HeapLock<R, S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_ALIGN {
            return null_mut();
        }

        self.lock().alloc(layout.size()).map_or(null_mut(), |nn| nn.as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let result = self.lock().free(ptr);
        debug_assert!(result.is_ok(), "dealloc({:p}) failed: {:?}", ptr, result);
    }
}

unsafe impl<R: lock_api::RawMutex, S: Source> Allocator for HeapLock<R, S> {
    fn allocate(&self, layout: Layout) -> core::result::Result<NonNull<[u8]>, AllocError> {
        if layout.align() > BLOCK_ALIGN {
            return Err(AllocError);
        }

        if layout.size() == 0 {
            return Ok(ptr_utils::nonnull_slice_from_raw_parts(ptr_utils::dangling(layout), 0));
        }

        self.lock()
            .alloc(layout.size())
            .map(|nn| ptr_utils::nonnull_slice_from_raw_parts(nn, layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            let result = self.lock().free(ptr.as_ptr());
            debug_assert!(result.is_ok(), "deallocate({:p}) failed: {:?}", ptr, result);
        }
    }
}
