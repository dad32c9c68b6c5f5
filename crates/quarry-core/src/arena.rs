//! Bump/arena allocator over a growing list of raw chunks.
//!
//! Sub-allocations are pointer bumps; nothing is freed individually.
//! `reset` rewinds every chunk for reuse, and drop releases the lot.
//! Replaying the same allocation sequence after a `reset` walks the
//! same chunks in the same order, so it yields the same addresses.

use std::ptr::NonNull;

use crate::backing::{Backing, SystemBacking};
use crate::chunk::{CHUNK_ALIGN, RawChunk};
use crate::error::AllocError;
use crate::handle::{Handle, Route, next_origin_tag};
use crate::layout::Layout;
use crate::traits::RawAllocator;

/// Growable bump allocator.
///
/// All previously returned pointers remain valid until [`Arena::reset`]
/// or drop. Not safe for concurrent mutation; wrap in
/// [`LockedAllocator`](crate::locked::LockedAllocator) or keep one
/// arena per thread.
#[derive(Debug)]
pub struct Arena<B: Backing = SystemBacking> {
    chunks: Vec<RawChunk<B>>,
    current: usize,
    default_chunk_size: usize,
    backing: B,
    origin: u64,
}

impl Arena<SystemBacking> {
    /// Arena over the system allocator.
    pub fn new(default_chunk_size: usize) -> Result<Self, AllocError> {
        Self::with_backing(SystemBacking, default_chunk_size)
    }
}

impl<B: Backing> Arena<B> {
    /// Arena over an injected backing. `default_chunk_size` must be
    /// non-zero; no chunk is acquired until the first allocation.
    pub fn with_backing(backing: B, default_chunk_size: usize) -> Result<Self, AllocError> {
        if default_chunk_size == 0 {
            return Err(AllocError::InvalidConfig {
                reason: "default_chunk_size must be > 0",
            });
        }
        Ok(Self {
            chunks: Vec::new(),
            current: 0,
            default_chunk_size,
            backing,
            origin: next_origin_tag(),
        })
    }

    /// Bump-allocates `layout.size()` bytes at `layout.align()`.
    ///
    /// When the current chunk cannot satisfy the request the arena
    /// first advances through chunks appended earlier (so replays after
    /// `reset` are deterministic), then appends a chunk sized
    /// `max(default_chunk_size, size + align)` and retries once.
    /// Fails with `OutOfMemory` only if the backing refuses that chunk.
    pub fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let (size, align) = (layout.size(), layout.align());

        while self.current < self.chunks.len() {
            if let Some(ptr) = self.chunks[self.current].try_bump(size, align) {
                return Ok(ptr);
            }
            if self.current + 1 == self.chunks.len() {
                break;
            }
            // Bump semantics: space left behind in the exhausted chunk
            // is forfeited until the next reset.
            self.current += 1;
        }

        let grow_by = self
            .default_chunk_size
            .max(size.checked_add(align).ok_or(AllocError::InvalidLayout {
                size,
                align,
            })?);
        let chunk = RawChunk::new(&self.backing, grow_by, CHUNK_ALIGN)?;
        self.chunks.push(chunk);
        self.current = self.chunks.len() - 1;

        // A fresh chunk of size + align bytes always fits the request.
        self.chunks[self.current]
            .try_bump(size, align)
            .ok_or(AllocError::OutOfMemory { size, align })
    }

    /// Rewinds every chunk's cursor to zero without releasing memory.
    ///
    /// Every pointer returned so far becomes logically invalid; the
    /// arena does not track individual liveness, so honoring that is
    /// the caller's responsibility.
    pub fn reset(&mut self) {
        for chunk in &mut self.chunks {
            chunk.rewind();
        }
        self.current = 0;
    }

    /// Number of chunks currently owned.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes consumed across all chunks, alignment padding included.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.chunks.iter().map(RawChunk::used).sum()
    }

    /// Total capacity across all chunks.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.chunks.iter().map(RawChunk::capacity).sum()
    }
}

impl<B: Backing> RawAllocator for Arena<B> {
    fn allocate(&mut self, layout: Layout) -> Result<Handle, AllocError> {
        let ptr = Arena::allocate(self, layout)?;
        Ok(Handle::new(ptr, Route::Chunked, self.origin))
    }

    /// Individual deallocation is a no-op; memory returns on `reset`
    /// or drop. Debug builds still reject handles from elsewhere.
    fn deallocate(&mut self, handle: Handle, _layout: Layout) -> Result<(), AllocError> {
        #[cfg(debug_assertions)]
        if handle.route() != Route::Chunked || !handle.verify(self.origin) {
            return Err(AllocError::ForeignHandle {
                addr: handle.addr(),
            });
        }
        let _ = handle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::CountingBacking;

    fn layout(size: usize, align: usize) -> Layout {
        Layout::from_size_align(size, align).unwrap()
    }

    #[test]
    fn test_zero_default_chunk_size_rejected() {
        assert_eq!(
            Arena::new(0).unwrap_err(),
            AllocError::InvalidConfig {
                reason: "default_chunk_size must be > 0",
            }
        );
    }

    #[test]
    fn test_allocations_do_not_overlap_and_are_aligned() {
        let mut arena = Arena::new(1024).unwrap();
        let layouts = [
            layout(1, 1),
            layout(24, 8),
            layout(3, 16),
            layout(100, 4),
            layout(64, 64),
            layout(7, 2),
        ];
        let mut regions: Vec<(usize, usize)> = Vec::new();
        for l in layouts {
            let ptr = arena.allocate(l).unwrap().as_ptr() as usize;
            assert_eq!(ptr % l.align(), 0, "alignment violated");
            for &(start, len) in &regions {
                let disjoint = ptr + l.size() <= start || start + len <= ptr;
                assert!(disjoint, "regions overlap");
            }
            regions.push((ptr, l.size().max(1)));
        }
    }

    #[test]
    fn test_alignment_padding_consumed() {
        let mut arena = Arena::new(256).unwrap();
        // Leave the cursor at an odd offset, then demand align 16.
        arena.allocate(layout(3, 1)).unwrap();
        let ptr = arena.allocate(layout(3, 16)).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 16, 0);
    }

    #[test]
    fn test_grows_with_custom_sized_chunk_for_oversized_request() {
        let backing = CountingBacking::new();
        let mut arena = Arena::with_backing(backing.clone(), 64).unwrap();
        arena.allocate(layout(1000, 8)).unwrap();
        assert_eq!(arena.chunk_count(), 1);
        assert!(arena.capacity_bytes() >= 1000);
        assert_eq!(backing.allocations(), 1);
    }

    #[test]
    fn test_exhaustion_appends_default_sized_chunk() {
        let mut arena = Arena::new(128).unwrap();
        arena.allocate(layout(100, 8)).unwrap();
        arena.allocate(layout(100, 8)).unwrap();
        assert_eq!(arena.chunk_count(), 2);
    }

    #[test]
    fn test_reset_replays_identical_offsets() {
        let mut arena = Arena::new(128).unwrap();
        let seq = [
            layout(40, 8),
            layout(90, 16),
            layout(8, 4),
            layout(200, 8),
            layout(16, 2),
        ];
        let first: Vec<usize> = seq
            .iter()
            .map(|&l| arena.allocate(l).unwrap().as_ptr() as usize)
            .collect();
        let chunks_after_first = arena.chunk_count();

        arena.reset();
        assert_eq!(arena.used_bytes(), 0);

        let second: Vec<usize> = seq
            .iter()
            .map(|&l| arena.allocate(l).unwrap().as_ptr() as usize)
            .collect();
        assert_eq!(first, second);
        assert_eq!(arena.chunk_count(), chunks_after_first, "reset must reuse");
    }

    #[test]
    fn test_reset_releases_nothing_drop_releases_all() {
        let backing = CountingBacking::new();
        {
            let mut arena = Arena::with_backing(backing.clone(), 64).unwrap();
            for _ in 0..10 {
                arena.allocate(layout(48, 8)).unwrap();
            }
            let acquired = backing.allocations();
            arena.reset();
            assert_eq!(backing.deallocations(), 0);
            assert_eq!(backing.allocations(), acquired);
        }
        assert_eq!(backing.deallocations(), backing.allocations());
    }

    #[test]
    fn test_trait_deallocate_is_noop() {
        let mut arena = Arena::new(256).unwrap();
        let l = layout(32, 8);
        let handle = RawAllocator::allocate(&mut arena, l).unwrap();
        let used = arena.used_bytes();
        arena.deallocate(handle, l).unwrap();
        assert_eq!(arena.used_bytes(), used);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_trait_deallocate_rejects_foreign_handle() {
        let mut a = Arena::new(256).unwrap();
        let mut b = Arena::new(256).unwrap();
        let l = layout(32, 8);
        let handle = RawAllocator::allocate(&mut a, l).unwrap();
        assert!(matches!(
            b.deallocate(handle, l),
            Err(AllocError::ForeignHandle { .. })
        ));
    }
}
