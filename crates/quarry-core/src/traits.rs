//! The minimal allocator interface shared by every component.

use crate::error::AllocError;
use crate::handle::Handle;
use crate::layout::Layout;

/// Layout-driven allocate/deallocate, implemented by [`Arena`],
/// [`Pool`], [`Slab`], and [`SystemAllocator`], and by decorators such
/// as the instrumentation wrapper in `quarry-trace`.
///
/// `deallocate` takes the original layout because implementations that
/// go straight to the backing need it to release the block; pooled
/// implementations ignore it and trust only the handle's recorded
/// route.
///
/// [`Arena`]: crate::arena::Arena
/// [`Pool`]: crate::pool::Pool
/// [`Slab`]: crate::slab::Slab
/// [`SystemAllocator`]: crate::backing::SystemAllocator
pub trait RawAllocator {
    /// Allocates a block satisfying `layout`.
    fn allocate(&mut self, layout: Layout) -> Result<Handle, AllocError>;

    /// Returns a block previously allocated by this allocator.
    ///
    /// `layout` must be the layout passed to [`RawAllocator::allocate`].
    fn deallocate(&mut self, handle: Handle, layout: Layout) -> Result<(), AllocError>;
}
