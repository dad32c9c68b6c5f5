//! Manual memory-allocation toolkit.
//!
//! Three allocators over raw chunks plus the plumbing they share:
//!
//! - [`Arena`]: pointer-bump allocation from growable chunks, freed en
//!   masse by [`Arena::reset`] or drop.
//! - [`Pool`]: fixed-size blocks recycled through an intrusive free
//!   list, O(1) allocate/deallocate after warm-up.
//! - [`Slab`]: size-classed pools with a direct backing path for large
//!   requests.
//!
//! Raw memory comes from a [`Backing`] capability injected at
//! construction ([`SystemBacking`] in production, a counting fake in
//! tests). Allocators hand out opaque [`Handle`]s that record their
//! deallocation route. None of the allocators is safe for concurrent
//! mutation; share one through [`LockedAllocator`] or keep an instance
//! per thread. Accounting and reporting live in the `quarry-trace`
//! crate, which decorates any [`RawAllocator`].

pub mod arena;
pub mod backing;
pub mod chunk;
pub mod error;
pub mod handle;
pub mod layout;
pub mod locked;
pub mod pool;
pub mod slab;
pub mod traits;

pub use arena::Arena;
pub use backing::{Backing, CountingBacking, SystemAllocator, SystemBacking};
pub use chunk::{CHUNK_ALIGN, RawChunk};
pub use error::AllocError;
pub use handle::{Handle, Route};
pub use layout::{Layout, align_up};
pub use locked::LockedAllocator;
pub use pool::{MIN_BLOCK_SIZE, Pool, PoolConfig};
pub use slab::{MIN_CLASS_ALIGN, Slab, SlabConfig};
pub use traits::RawAllocator;
