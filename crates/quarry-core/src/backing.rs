//! Raw-memory backing: the system-allocator collaborator.
//!
//! Every allocator in this crate receives its backing as an explicit
//! capability at construction instead of reaching for ambient global
//! state, so tests can substitute a counting fake and observe chunk
//! traffic directly.

use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::AllocError;
use crate::handle::{Handle, Route, next_origin_tag};
use crate::layout::Layout;
use crate::traits::RawAllocator;

/// Source of raw memory blocks.
///
/// Implementations hand out uninitialized blocks and release them on
/// request. `Clone` is required because chunks keep a copy of their
/// backing so they can release themselves on drop.
pub trait Backing: Clone {
    /// Allocates `size` bytes aligned to `align` (a power of two).
    ///
    /// Zero-size requests are served as one byte, mirroring `malloc(0)`.
    fn raw_allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block previously returned by [`Backing::raw_allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `raw_allocate` on this backing with the same
    /// `size` and `align`, and must not have been deallocated already.
    unsafe fn raw_deallocate(&self, ptr: NonNull<u8>, size: usize, align: usize);
}

fn std_layout(size: usize, align: usize) -> Result<std::alloc::Layout, AllocError> {
    std::alloc::Layout::from_size_align(size.max(1), align)
        .map_err(|_| AllocError::InvalidLayout { size, align })
}

/// The process allocator (`std::alloc`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemBacking;

impl Backing for SystemBacking {
    fn raw_allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let layout = std_layout(size, align)?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::OutOfMemory { size, align })
    }

    unsafe fn raw_deallocate(&self, ptr: NonNull<u8>, size: usize, align: usize) {
        let layout = std_layout(size, align).expect("valid layout");
        // SAFETY: caller guarantees ptr was allocated with this layout.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

/// A backing that forwards to [`SystemBacking`] while counting traffic.
///
/// Clones share their counters, so a test can hand one to an allocator
/// and keep another to assert on chunk allocation counts.
#[derive(Debug, Clone, Default)]
pub struct CountingBacking {
    inner: SystemBacking,
    allocations: Arc<AtomicUsize>,
    deallocations: Arc<AtomicUsize>,
    bytes_allocated: Arc<AtomicUsize>,
}

impl CountingBacking {
    /// Creates a counting backing with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `raw_allocate` calls that succeeded.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of `raw_deallocate` calls.
    #[must_use]
    pub fn deallocations(&self) -> usize {
        self.deallocations.load(Ordering::Relaxed)
    }

    /// Total bytes handed out across all successful allocations.
    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.load(Ordering::Relaxed)
    }
}

impl Backing for CountingBacking {
    fn raw_allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.inner.raw_allocate(size, align)?;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated.fetch_add(size, Ordering::Relaxed);
        Ok(ptr)
    }

    unsafe fn raw_deallocate(&self, ptr: NonNull<u8>, size: usize, align: usize) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        // SAFETY: forwarded with the caller's contract unchanged.
        unsafe { self.inner.raw_deallocate(ptr, size, align) };
    }
}

/// A [`RawAllocator`] directly over a backing, with no pooling.
///
/// Every request goes straight to the backing. This is the baseline the
/// instrumentation decorator wraps when no arena/pool/slab is in play,
/// and the reference behavior the other allocators are measured against.
#[derive(Debug)]
pub struct SystemAllocator<B: Backing = SystemBacking> {
    backing: B,
    origin: u64,
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemAllocator {
    /// System allocator over [`SystemBacking`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_backing(SystemBacking)
    }
}

impl<B: Backing> SystemAllocator<B> {
    /// System allocator over an injected backing.
    pub fn with_backing(backing: B) -> Self {
        Self {
            backing,
            origin: next_origin_tag(),
        }
    }
}

impl<B: Backing> RawAllocator for SystemAllocator<B> {
    fn allocate(&mut self, layout: Layout) -> Result<Handle, AllocError> {
        let ptr = self.backing.raw_allocate(layout.size(), layout.align())?;
        Ok(Handle::new(ptr, Route::Large, self.origin))
    }

    fn deallocate(&mut self, handle: Handle, layout: Layout) -> Result<(), AllocError> {
        #[cfg(debug_assertions)]
        if !handle.verify(self.origin) {
            return Err(AllocError::ForeignHandle {
                addr: handle.addr(),
            });
        }
        // SAFETY: the handle was produced by this allocator's backing;
        // the caller supplies the original layout per the trait contract.
        unsafe {
            self.backing
                .raw_deallocate(handle.ptr(), layout.size(), layout.align());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_backing_round_trip() {
        let backing = SystemBacking;
        let ptr = backing.raw_allocate(128, 16).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 16, 0);
        // SAFETY: just allocated with this size/align.
        unsafe { backing.raw_deallocate(ptr, 128, 16) };
    }

    #[test]
    fn test_zero_size_served_as_one_byte() {
        let backing = SystemBacking;
        let ptr = backing.raw_allocate(0, 1).unwrap();
        // SAFETY: allocated above.
        unsafe { backing.raw_deallocate(ptr, 0, 1) };
    }

    #[test]
    fn test_counting_backing_shares_counters_across_clones() {
        let backing = CountingBacking::new();
        let observer = backing.clone();
        let ptr = backing.raw_allocate(64, 8).unwrap();
        assert_eq!(observer.allocations(), 1);
        assert_eq!(observer.bytes_allocated(), 64);
        // SAFETY: allocated above.
        unsafe { backing.raw_deallocate(ptr, 64, 8) };
        assert_eq!(observer.deallocations(), 1);
    }

    #[test]
    fn test_system_allocator_round_trip() {
        let mut alloc = SystemAllocator::new();
        let layout = Layout::from_size_align(256, 32).unwrap();
        let handle = alloc.allocate(layout).unwrap();
        assert_eq!(handle.addr() % 32, 0);
        alloc.deallocate(handle, layout).unwrap();
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_system_allocator_rejects_foreign_handle() {
        let mut a = SystemAllocator::new();
        let mut b = SystemAllocator::new();
        let layout = Layout::from_size_align(32, 8).unwrap();
        let handle = a.allocate(layout).unwrap();
        assert!(matches!(
            b.deallocate(handle, layout),
            Err(AllocError::ForeignHandle { .. })
        ));
        a.deallocate(handle, layout).unwrap();
    }
}
