//! The heap region viewed as an arena of blocks addressed by byte offsets.
//!
//! Offset `0` is the header of the lowest block, which sits 4 bytes past the
//! start of the reserved memory so that every payload is 8-byte aligned.
//! Offset `usable` is the end marker, occupying the last 4 bytes.
//!
//! ```text
//!  mapping base                                                 mapping end
//!  | pad | hdr | payload ...  | hdr | payload ... | footer | END |
//!        ^ offset 0                                       ^ offset usable
//! ```

use core::ptr::NonNull;

use crate::error::{HeapError, Result};
use crate::ptr_utils;

use super::{tag::Tag, BLOCK_ALIGN, REGION_OVERHEAD, TAG_SIZE};

/// An initialized heap region.
#[derive(Debug)]
pub(crate) struct Region {
    /// The memory handed out by the source.
    mapping: NonNull<[u8]>,
    /// Address of the header at offset zero.
    first: NonNull<u8>,
    /// Bytes from offset zero to the end marker.
    usable: usize,
}

impl Region {
    /// Lays out a fresh region: one free block spanning the usable space,
    /// followed by the end marker.
    ///
    /// # Safety
    /// `mapping` must be valid for reads and writes of `rounded` bytes,
    /// aligned to [`BLOCK_ALIGN`], and exclusively owned by the returned region.
    /// `rounded - REGION_OVERHEAD` must be a valid block size.
    pub unsafe fn format(mapping: NonNull<[u8]>, rounded: usize) -> Self {
        debug_assert!(mapping.len() >= rounded);
        debug_assert!(ptr_utils::is_aligned_to(mapping.cast::<u8>().as_ptr(), BLOCK_ALIGN));

        let first = NonNull::new_unchecked(mapping.cast::<u8>().as_ptr().add(TAG_SIZE));
        let usable = rounded - REGION_OVERHEAD;

        let mut region = Self { mapping, first, usable };

        region.set_tag(0, Tag::new(usable, false, true));
        region.set_footer(0, usable);
        region.set_tag(usable, Tag::END);

        region
    }

    #[inline]
    pub fn mapping(&self) -> NonNull<[u8]> {
        self.mapping
    }

    #[inline]
    pub fn first(&self) -> NonNull<u8> {
        self.first
    }

    #[inline]
    pub fn usable(&self) -> usize {
        self.usable
    }

    /// Reads the header at `offset`.
    #[inline]
    #[track_caller]
    pub fn tag(&self, offset: usize) -> Tag {
        debug_assert!(offset <= self.usable && offset % BLOCK_ALIGN == 0, "bad offset {:#x}", offset);

        // SAFETY: headers at 8-aligned offsets up to and including `usable`
        // lie within the mapping and are 4-byte aligned
        Tag::from_raw(unsafe { self.first.as_ptr().add(offset).cast::<u32>().read() })
    }

    #[inline]
    #[track_caller]
    pub fn set_tag(&mut self, offset: usize, tag: Tag) {
        debug_assert!(offset <= self.usable && offset % BLOCK_ALIGN == 0, "bad offset {:#x}", offset);

        // SAFETY: see `tag`
        unsafe { self.first.as_ptr().add(offset).cast::<u32>().write(tag.into_raw()) }
    }

    /// Reads the footer of the free block ending at `end`.
    #[inline]
    #[track_caller]
    pub fn footer(&self, end: usize) -> usize {
        debug_assert!(end >= BLOCK_ALIGN && end <= self.usable && end % BLOCK_ALIGN == 0);

        // SAFETY: the footer occupies the 4 bytes below a block end, within the mapping
        unsafe { self.first.as_ptr().add(end - TAG_SIZE).cast::<u32>().read() as usize }
    }

    /// Writes the footer of a free block of `size` bytes at `offset`.
    #[inline]
    #[track_caller]
    pub fn set_footer(&mut self, offset: usize, size: usize) {
        debug_assert!(size >= BLOCK_ALIGN && offset + size <= self.usable);

        let footer = Tag::new(size, false, false).footer();

        // SAFETY: see `footer`
        unsafe { self.first.as_ptr().add(offset + size - TAG_SIZE).cast::<u32>().write(footer) }
    }

    /// The payload address of the block at `offset`.
    #[inline]
    pub fn payload(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset < self.usable);

        // SAFETY: the payload starts within the block, below the end marker
        unsafe { NonNull::new_unchecked(self.first.as_ptr().add(offset + TAG_SIZE)) }
    }

    /// Maps a payload address back to its header offset,
    /// checking that it's within bounds and aligned.
    pub fn payload_offset(&self, ptr: *mut u8) -> Result<usize> {
        let base = self.first.as_ptr() as usize + TAG_SIZE;

        let offset = match (ptr as usize).checked_sub(base) {
            Some(offset) if offset < self.usable => offset,
            _ => return Err(HeapError::OutOfBounds),
        };

        if !ptr_utils::is_aligned_to(ptr, BLOCK_ALIGN) {
            return Err(HeapError::Misaligned);
        }

        debug_assert!(offset % BLOCK_ALIGN == 0);
        Ok(offset)
    }

    /// Returns the header of the block starting exactly at `offset`,
    /// or `None` if no block in the chain starts there.
    pub fn block_at(&self, offset: usize) -> Option<Tag> {
        for (block, tag) in self.chain() {
            if block == offset {
                return Some(tag);
            } else if block > offset {
                break;
            }
        }

        None
    }

    /// Walks the blocks in address order, excluding the end marker.
    #[inline]
    pub fn chain(&self) -> Chain<'_> {
        Chain { region: self, offset: 0 }
    }
}

/// Iterator over `(offset, header)` of every block in a [`Region`].
///
/// Stops early, rather than reading out of bounds, if it meets a header
/// whose size can't be right.
#[derive(Debug, Clone)]
pub(crate) struct Chain<'r> {
    region: &'r Region,
    offset: usize,
}

impl Iterator for Chain<'_> {
    type Item = (usize, Tag);

    fn next(&mut self) -> Option<Self::Item> {
        let usable = self.region.usable;

        if self.offset >= usable {
            return None;
        }

        let tag = self.region.tag(self.offset);
        let size = tag.size();

        if size == 0 || size % BLOCK_ALIGN != 0 || size > usable - self.offset {
            debug_assert!(false, "corrupt header {:?} at offset {:#x}", tag, self.offset);
            self.offset = usable;
            return None;
        }

        let item = (self.offset, tag);
        self.offset += size;
        Some(item)
    }
}
