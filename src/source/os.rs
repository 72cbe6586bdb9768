use core::{num::NonZeroUsize, ptr::NonNull};

use crate::ptr_utils;

use super::{Source, DEFAULT_PAGE_SIZE};

/// Map the region straight from the operating system with `mmap`.
///
/// The mapping is anonymous, private, readable and writable, which the
/// kernel zero-fills. It's unmapped when the heap is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Os;

unsafe impl Source for Os {
    fn page_size(&self) -> usize {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

        if size > 0 {
            size as usize
        } else {
            DEFAULT_PAGE_SIZE
        }
    }

    fn reserve(&mut self, size: NonZeroUsize) -> Option<NonNull<[u8]>> {
        let base = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size.get(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            return None;
        }

        NonNull::new(base.cast::<u8>()).map(|base| ptr_utils::nonnull_slice_from_raw_parts(base, size.get()))
    }

    unsafe fn release(&mut self, region: NonNull<[u8]>) {
        let result = libc::munmap(region.cast::<libc::c_void>().as_ptr(), region.len());

        // panicking may allocate, and the global allocator may be the caller
        #[cfg(debug_assertions)]
        if result != 0 {
            libc::abort();
        }

        #[cfg(not(debug_assertions))]
        let _ = result;
    }
}
