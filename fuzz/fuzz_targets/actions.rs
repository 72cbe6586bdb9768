#![no_main]

use std::alloc::System;

use tagheap::*;

use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Actions {
    /// Allocate a payload of the given size
    Alloc { size: u16 },
    /// Free the ith allocation
    Free { index: u8 },
    /// Free the ith allocation twice
    DoubleFree { index: u8 },
    /// Free an address inside the ith allocation
    FreeInterior { index: u8, offset: u16 },
}
use Actions::*;

fuzz_target!(|input: (u16, Vec<Actions>)| {
    let (region_size, actions) = input;

    let mut heap = Heap::new(GlobalAllocSource::with_page_size(System, 64));
    if heap.init(region_size as usize).is_err() {
        return;
    }

    let mut allocations: Vec<(*mut u8, usize, u8)> = vec![];

    for action in actions {
        match action {
            Alloc { size } => {
                let Some(ptr) = heap.alloc(size as usize) else { continue };

                let fill = allocations.len() as u8;
                unsafe { ptr.as_ptr().write_bytes(fill, size as usize) };
                allocations.push((ptr.as_ptr(), size as usize, fill));
            }
            Free { index } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, size, fill) = allocations.swap_remove(index as usize);
                let payload = unsafe { std::slice::from_raw_parts(ptr, size) };
                assert!(payload.iter().all(|&byte| byte == fill));

                heap.free(ptr).unwrap();
            }
            DoubleFree { index } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, _, _) = allocations.swap_remove(index as usize);
                heap.free(ptr).unwrap();
                assert_eq!(heap.free(ptr), Err(HeapError::DoubleFree));
            }
            FreeInterior { index, offset } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, size, _) = allocations[index as usize];
                let offset = offset as usize % (size + 1);
                if offset == 0 { continue; }

                let before = heap.stats();
                assert!(heap.free(ptr.wrapping_add(offset)).is_err());
                assert_eq!(heap.stats(), before);
            }
        }

        let stats = heap.stats();
        assert_eq!(stats.total_bytes, heap.usable_size());
        assert_eq!(stats.allocated_blocks, allocations.len());
        assert_eq!(heap.counters().allocation_count, allocations.len());
    }

    for (ptr, _, _) in allocations {
        heap.free(ptr).unwrap();
    }

    assert_eq!(heap.stats().free_blocks, 1);
});
