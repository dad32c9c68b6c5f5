//! Mutex-guarded allocator for sharing across threads.
//!
//! Arena, pool, and slab mutate internal pointers non-atomically, so
//! they are not safe for concurrent use on their own. This wrapper
//! serializes operations in lock-acquisition order (no fairness
//! guarantee beyond what the lock provides). The alternative, one
//! allocator instance per thread, avoids the lock entirely.

use parking_lot::Mutex;

use crate::error::AllocError;
use crate::handle::Handle;
use crate::layout::Layout;
use crate::traits::RawAllocator;

/// A [`RawAllocator`] behind a `parking_lot::Mutex`, usable through
/// `&self`.
#[derive(Debug)]
pub struct LockedAllocator<A: RawAllocator> {
    inner: Mutex<A>,
}

impl<A: RawAllocator> LockedAllocator<A> {
    /// Wraps an allocator.
    pub fn new(inner: A) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Allocates under the lock.
    pub fn allocate(&self, layout: Layout) -> Result<Handle, AllocError> {
        self.inner.lock().allocate(layout)
    }

    /// Deallocates under the lock.
    pub fn deallocate(&self, handle: Handle, layout: Layout) -> Result<(), AllocError> {
        self.inner.lock().deallocate(handle, layout)
    }

    /// Runs `f` with exclusive access to the inner allocator, for
    /// operations beyond the trait surface (e.g. `Arena::reset`).
    pub fn with<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Unwraps the inner allocator.
    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }
}
