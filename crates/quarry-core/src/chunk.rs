//! Raw chunks: owned contiguous regions carved up by arenas and pools.
//!
//! A chunk is acquired from its backing at construction, exclusively
//! owned by one allocator, and released exactly once when dropped.

use std::ptr::NonNull;

use crate::backing::Backing;
use crate::error::AllocError;
use crate::layout::align_up;

/// Alignment every chunk is allocated with. Matches the largest
/// alignment the size-class pools guarantee, so any block offset that
/// is a multiple of a class size is also class-aligned.
pub const CHUNK_ALIGN: usize = 16;

/// An owned contiguous memory region with a bump cursor.
///
/// Invariants: `used <= capacity`; `base` is valid for `capacity`
/// bytes until drop.
#[derive(Debug)]
pub struct RawChunk<B: Backing> {
    base: NonNull<u8>,
    capacity: usize,
    used: usize,
    align: usize,
    backing: B,
}

// SAFETY: the chunk exclusively owns the region behind `base`; moving
// the chunk between threads moves that ownership with it.
unsafe impl<B: Backing + Send> Send for RawChunk<B> {}

impl<B: Backing> RawChunk<B> {
    /// Acquires a chunk of `capacity` bytes from the backing.
    pub fn new(backing: &B, capacity: usize, align: usize) -> Result<Self, AllocError> {
        let base = backing.raw_allocate(capacity, align)?;
        Ok(Self {
            base,
            capacity,
            used: 0,
            align,
            backing: backing.clone(),
        })
    }

    /// Total bytes in the chunk.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed by the bump cursor, including alignment padding.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Base address as an integer.
    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// True if `addr` falls inside this chunk.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base_addr();
        addr >= base && addr < base + self.capacity
    }

    /// Bump-allocates `size` bytes at `align` from the cursor.
    ///
    /// Returns `None` when the remaining space (after alignment
    /// padding) cannot hold the request; the chunk is left unchanged.
    pub fn try_bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.base_addr();
        // Aligning the absolute address rather than the offset keeps
        // the result correct for alignments above the chunk's own.
        let cursor = base.checked_add(self.used)?;
        if cursor > usize::MAX - (align - 1) {
            return None;
        }
        let aligned = align_up(cursor, align);
        let end = aligned.checked_add(size)?;
        if end > base + self.capacity {
            return None;
        }
        self.used = end - base;
        // SAFETY: aligned is within [base, base + capacity), derived
        // from the live allocation starting at self.base.
        Some(unsafe { NonNull::new_unchecked(aligned as *mut u8) })
    }

    /// Rewinds the bump cursor to the start without releasing memory.
    /// Previously returned pointers become logically invalid.
    pub fn rewind(&mut self) {
        self.used = 0;
    }
}

impl<B: Backing> Drop for RawChunk<B> {
    fn drop(&mut self) {
        // SAFETY: base was obtained from this backing with exactly
        // this capacity/align, and ownership is exclusive.
        unsafe {
            self.backing
                .raw_deallocate(self.base, self.capacity, self.align);
        }
    }
}
