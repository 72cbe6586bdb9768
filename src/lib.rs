//! The tagheap allocator crate.
//!
//! For getting started:
//! - Check out the crate's README.
//! - Read up on [`Heap`] and the [`Source`] it gets its region from.
//!
//! Your first step will be `Heap::new(...)`, then [`init`](Heap::init).
//! Wrap it in a [`HeapCell`] or a [`HeapLock`] to get an
//! [`Allocator`](allocator_api2::alloc::Allocator) or a
//! [`GlobalAlloc`](core::alloc::GlobalAlloc).

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
mod logging;
pub(crate) mod ptr_utils;

pub mod base;
pub mod cell;
pub mod error;
pub mod source;
pub mod sync;

#[cfg(feature = "counters")]
pub use base::counters::Counters;
pub use base::walk::{BlockDescriptor, BlockState, Blocks, HeapReport, HeapStats};
pub use base::{Heap, BLOCK_ALIGN, MIN_BLOCK_SIZE, MIN_SPLIT_SIZE, REGION_OVERHEAD, TAG_SIZE};
pub use cell::HeapCell;
pub use error::{HeapError, Result};
pub use source::{Claim, GlobalAllocSource, Source};
#[cfg(all(unix, feature = "system-backed"))]
pub use source::Os;
pub use sync::HeapLock;
