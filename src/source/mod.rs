//! Where a [`Heap`](crate::Heap) gets its region from.

use core::{fmt::Debug, num::NonZeroUsize, ptr::NonNull};

mod claim;
mod global_alloc;
#[cfg(all(unix, feature = "system-backed"))]
mod os;

pub use claim::Claim;
pub use global_alloc::GlobalAllocSource;
#[cfg(all(unix, feature = "system-backed"))]
pub use os::Os;

/// The page size assumed where the platform isn't asked.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// The smallest page size a [`Source`] may report.
pub const MIN_PAGE_SIZE: usize = 16;

/// Provides the single region a [`Heap`](crate::Heap) manages.
///
/// A heap calls [`reserve`](Source::reserve) once, from [`Heap::init`](crate::Heap::init),
/// and [`release`](Source::release) once, when it's dropped with a region.
///
/// # Safety
///
/// Memory returned by [`reserve`](Source::reserve) must be exclusively owned
/// by the caller until it's passed to [`release`](Source::release), readable
/// and writable, filled with zeroes, and at least 8-byte aligned.
///
/// Do not use the parent [`HeapLock`](crate::HeapLock) or [`HeapCell`](crate::HeapCell)
/// in the implementation, directly or through the global allocator.
/// The former will deadlock, the latter will panic.
pub unsafe trait Source: Debug {
    /// The granularity region sizes are rounded up to.
    ///
    /// Must be a power of two no smaller than [`MIN_PAGE_SIZE`].
    fn page_size(&self) -> usize;

    /// Reserve at least `size` bytes of zeroed memory, or return `None`.
    ///
    /// `size` is a multiple of [`page_size`](Source::page_size).
    fn reserve(&mut self, size: NonZeroUsize) -> Option<NonNull<[u8]>>;

    /// Give back a region returned by [`reserve`](Source::reserve).
    ///
    /// # Safety
    /// `region` must be exactly what `reserve` returned, and must not be used afterwards.
    unsafe fn release(&mut self, region: NonNull<[u8]>) {
        let _ = region;
    }
}
