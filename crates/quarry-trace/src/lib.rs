//! Allocation accounting for the quarry allocators.
//!
//! [`InstrumentedAllocator`] decorates any
//! [`RawAllocator`](quarry_core::RawAllocator), counting allocations,
//! live bytes, failures, and a power-of-two size histogram, and
//! recording one structured lifecycle event per operation.
//! [`AllocatorStats`] is the read-only snapshot handed to whatever
//! formats and ships the numbers.

pub mod events;
pub mod instrument;
pub mod stats;

pub use events::{EventLevel, EventRecord};
pub use instrument::{InstrumentedAllocator, StatsHandle};
pub use stats::{AllocatorStats, NUM_SIZE_BUCKETS, bucket_floor, bucket_index};
