//! Allocator error taxonomy.
//!
//! Allocation failure is always a returned error, never a panic: callers
//! may have fallback strategies (retry with a smaller chunk, propagate,
//! shed load). Caller-invariant violations (double free, foreign handle)
//! are checked where the bookkeeping is cheap and, for the pool fast
//! path, only in debug builds -- see the variant docs.

use thiserror::Error;

/// Errors produced by the quarry allocators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The backing allocator could not supply the requested memory.
    ///
    /// Always recoverable: retry smaller, retry later, or propagate.
    #[error("out of memory: backing refused {size} bytes (align {align})")]
    OutOfMemory { size: usize, align: usize },

    /// `align` is not a power of two, or the size/align combination
    /// overflows address arithmetic. Only malformed caller input
    /// triggers this, never internal logic.
    #[error("invalid layout: size {size}, align {align}")]
    InvalidLayout { size: usize, align: usize },

    /// A construction-time configuration value is out of contract
    /// (zero chunk size, unsorted size classes, undersized block).
    #[error("invalid allocator configuration: {reason}")]
    InvalidConfig { reason: &'static str },

    /// The block is already on the free list.
    ///
    /// Detected on the pool fast path only under `debug_assertions`
    /// (the free-set bookkeeping is compiled out in release builds,
    /// making a pool double free undefined behavior there). The slab
    /// large path keeps its directory in all builds and reports this
    /// unconditionally.
    #[error("double free: block {addr:#x} is already free")]
    DoubleFree { addr: usize },

    /// The handle was returned to an allocator that did not originate
    /// it, detected via the instance tag embedded in the handle.
    /// Pool/arena origin checks run only under `debug_assertions`.
    #[error("foreign handle: block {addr:#x} does not belong to this allocator")]
    ForeignHandle { addr: usize },
}

impl AllocError {
    /// True when the error is the recoverable out-of-memory case, as
    /// opposed to a caller bug.
    #[must_use]
    pub const fn is_oom(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}
