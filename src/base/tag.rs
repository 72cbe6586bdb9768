//! A `Tag` is a block size with status flags in the two least significant bits.
//!
//! Block sizes are always multiples of 8, so the low bits are free to hold
//! the flags. Headers carry both flags, footers carry only the size.

/// Block header metadata.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Tag(u32);

impl core::fmt::Debug for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_end() {
            return f.write_str("Tag(END)");
        }

        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("is_allocated", &self.is_allocated())
            .field("is_prev_allocated", &self.is_prev_allocated())
            .finish()
    }
}

impl Tag {
    pub const ALLOCATED_FLAG: u32 = 1 << 0;
    pub const PREV_ALLOCATED_FLAG: u32 = 1 << 1;

    const FLAGS: u32 = Self::ALLOCATED_FLAG | Self::PREV_ALLOCATED_FLAG;

    /// The sentinel terminating the block chain: allocated, size zero.
    pub const END: Tag = Tag(Self::ALLOCATED_FLAG);

    /// The largest block size a tag can hold.
    pub const MAX_SIZE: usize = (u32::MAX & !7) as usize;

    #[inline]
    #[track_caller]
    pub fn new(size: usize, is_allocated: bool, is_prev_allocated: bool) -> Self {
        debug_assert!(size % 8 == 0, "block size {} is not a multiple of 8", size);
        debug_assert!(size != 0 && size <= Self::MAX_SIZE, "block size {} out of range", size);

        Tag(size as u32)
            .with_allocated(is_allocated)
            .with_prev_allocated(is_prev_allocated)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Tag(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn size(self) -> usize {
        (self.0 & !Self::FLAGS) as usize
    }

    #[inline]
    pub const fn is_allocated(self) -> bool {
        self.0 & Self::ALLOCATED_FLAG != 0
    }

    #[inline]
    pub const fn is_prev_allocated(self) -> bool {
        self.0 & Self::PREV_ALLOCATED_FLAG != 0
    }

    #[inline]
    pub const fn is_end(self) -> bool {
        self.0 == Self::END.0
    }

    #[inline]
    pub const fn with_allocated(self, is_allocated: bool) -> Self {
        if is_allocated {
            Tag(self.0 | Self::ALLOCATED_FLAG)
        } else {
            Tag(self.0 & !Self::ALLOCATED_FLAG)
        }
    }

    #[inline]
    pub const fn with_prev_allocated(self, is_prev_allocated: bool) -> Self {
        if is_prev_allocated {
            Tag(self.0 | Self::PREV_ALLOCATED_FLAG)
        } else {
            Tag(self.0 & !Self::PREV_ALLOCATED_FLAG)
        }
    }

    /// Replaces the size, keeping both flags.
    #[inline]
    #[track_caller]
    pub fn with_size(self, size: usize) -> Self {
        debug_assert!(size % 8 == 0 && size != 0 && size <= Self::MAX_SIZE);

        Tag(size as u32 | (self.0 & Self::FLAGS))
    }

    /// The footer value for this block: the size without flags.
    #[inline]
    pub const fn footer(self) -> u32 {
        self.0 & !Self::FLAGS
    }
}
