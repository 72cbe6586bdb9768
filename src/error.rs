//! The error type shared by every heap operation.

/// Failure of a heap operation.
///
/// Every validation happens before the heap is touched, so an error
/// always leaves the block chain exactly as it was.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapError {
    /// The requested region or payload size is zero, or too large to be represented.
    #[error("requested size is zero or not representable")]
    InvalidSize,

    /// [`Heap::init`](crate::Heap::init) was called on a heap that already owns a region.
    #[error("heap has already been initialized")]
    AlreadyInitialized,

    /// The memory source could not provide the region.
    #[error("memory source cannot provide the requested region")]
    RegionUnavailable,

    /// The heap has no region yet.
    #[error("heap has not been initialized")]
    Uninitialized,

    /// A null pointer was passed to [`Heap::free`](crate::Heap::free).
    #[error("null pointer")]
    NullPointer,

    /// The pointer does not point into the heap region.
    #[error("pointer lies outside the heap region")]
    OutOfBounds,

    /// The pointer is not 8-byte aligned, so it can't be a payload address.
    #[error("pointer is not 8-byte aligned")]
    Misaligned,

    /// The pointer does not denote a currently allocated block:
    /// either it was freed already or it was never returned by an allocation.
    #[error("pointer does not denote an allocated block")]
    DoubleFree,

    /// No free block is large enough for the request.
    #[error("no free block is large enough")]
    CapacityExhausted,
}

/// Shorthand for results of heap operations.
pub type Result<T> = core::result::Result<T, HeapError>;
