//! Generic utilities for pointer handling and sizing.

use core::{alloc::Layout, ptr::NonNull};

/// Rounds `size` up to the next multiple of `align`.
///
/// Returns `None` if the result does not fit in a `usize`.
/// `align` must be a power of two.
#[inline]
pub const fn round_up_to(size: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());

    match size.checked_add(align - 1) {
        Some(sum) => Some(sum & !(align - 1)),
        None => None,
    }
}

/// Returns whether the address of `ptr` is a multiple of `align`.
///
/// `align` must be a power of two.
#[inline(always)]
pub fn is_aligned_to(ptr: *mut u8, align: usize) -> bool {
    debug_assert!(align.is_power_of_two());

    ptr as usize & (align - 1) == 0
}

/// A well-aligned, non-null pointer for zero-sized allocations.
#[inline(always)]
pub fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: alignments are never zero
    unsafe { NonNull::new_unchecked(core::ptr::null_mut::<u8>().wrapping_add(layout.align())) }
}

#[inline(always)]
pub fn nonnull_slice_from_raw_parts(nn: NonNull<u8>, len: usize) -> NonNull<[u8]> {
    // SAFETY: if `nn` is non-null, then the resulting slice is non-null
    unsafe { NonNull::new_unchecked(core::ptr::slice_from_raw_parts_mut(nn.as_ptr(), len)) }
}
