//! Read-only allocation statistics snapshots.
//!
//! Counters live in the instrumentation decorator as independent
//! atomics; a snapshot copies them one by one with relaxed loads, so
//! under concurrent load it is an approximation, not a linearizable
//! cut. Serialization is derived so the embedding application's
//! logging collaborator can format snapshots; rendering is out of
//! scope here.

use serde::Serialize;

/// Number of power-of-two size buckets in the histogram.
///
/// Bucket 0 is `[0, 16)`, bucket `i >= 1` is `[2^(i+3), 2^(i+4))`; the
/// last bucket also absorbs everything larger.
pub const NUM_SIZE_BUCKETS: usize = 24;

/// Histogram bucket index for a requested size.
#[must_use]
pub fn bucket_index(size: usize) -> usize {
    if size < 16 {
        return 0;
    }
    let log2 = (usize::BITS - 1 - size.leading_zeros()) as usize;
    (log2 - 3).min(NUM_SIZE_BUCKETS - 1)
}

/// Lower bound of a histogram bucket, for reporting.
#[must_use]
pub fn bucket_floor(index: usize) -> usize {
    if index == 0 { 0 } else { 1 << (index + 3) }
}

/// Snapshot of an instrumented allocator's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    /// Allocations not yet deallocated.
    pub live_allocations: usize,
    /// Sum of requested sizes of live allocations.
    pub live_bytes: usize,
    /// Successful allocations since construction.
    pub total_allocations: u64,
    /// Sum of requested sizes across all successful allocations.
    pub total_bytes: u64,
    /// Allocations the inner allocator refused.
    pub failed_allocations: u64,
    /// Successful allocation counts per power-of-two size bucket.
    pub size_histogram: [u64; NUM_SIZE_BUCKETS],
}

impl AllocatorStats {
    /// A zeroed snapshot.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            live_allocations: 0,
            live_bytes: 0,
            total_allocations: 0,
            total_bytes: 0,
            failed_allocations: 0,
            size_histogram: [0; NUM_SIZE_BUCKETS],
        }
    }
}
