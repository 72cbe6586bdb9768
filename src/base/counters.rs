//! Track allocation counters for a [`Heap`].

use crate::{Heap, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Counters {
    /// Number of active allocations.
    pub allocation_count: usize,
    /// Total number of allocations.
    pub total_allocation_count: u64,

    /// Sum of active allocations' block sizes, headers and padding included.
    pub allocated_bytes: usize,
    /// Sum of all allocations' block sizes.
    pub total_allocated_bytes: u64,

    /// Sum of free block sizes.
    pub available_bytes: usize,
    /// Number of free blocks.
    pub fragment_count: usize,

    /// Size of the usable region, from the first header up to the end marker.
    pub region_bytes: usize,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            allocation_count: 0,
            total_allocation_count: 0,
            allocated_bytes: 0,
            total_allocated_bytes: 0,
            available_bytes: 0,
            fragment_count: 0,
            region_bytes: 0,
        }
    }

    /// Returns the total number of allocated bytes freed.
    pub const fn total_freed_bytes(&self) -> u64 {
        self.total_allocated_bytes - self.allocated_bytes as u64
    }

    /// Returns the number of bytes spent on headers and padding of live allocations,
    /// given the sum of their requested payload sizes.
    pub const fn overhead_bytes(&self, requested_bytes: usize) -> usize {
        self.allocated_bytes - requested_bytes
    }

    pub(crate) fn account_init(&mut self, usable: usize) {
        self.region_bytes = usable;
        self.account_register_gap(usable);
    }

    pub(crate) fn account_register_gap(&mut self, size: usize) {
        self.available_bytes += size;
        self.fragment_count += 1;
    }
    pub(crate) fn account_deregister_gap(&mut self, size: usize) {
        self.available_bytes -= size;
        self.fragment_count -= 1;
    }

    pub(crate) fn account_alloc(&mut self, block_size: usize) {
        self.allocation_count += 1;
        self.allocated_bytes += block_size;

        self.total_allocation_count += 1;
        self.total_allocated_bytes += block_size as u64;
    }

    pub(crate) fn account_dealloc(&mut self, block_size: usize) {
        self.allocation_count -= 1;
        self.allocated_bytes -= block_size;
    }
}

impl<S: Source> Heap<S> {
    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}
