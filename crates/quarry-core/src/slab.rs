//! Slab allocator: size-classed pools with a large-request fallback.
//!
//! Requests up to the large threshold are rounded up to the smallest
//! size class and served by that class's pool; a request whose size
//! exactly equals a class boundary belongs to that class. Requests
//! above the threshold, or whose alignment exceeds what the classes
//! guarantee, go straight to the backing and are recorded in a
//! directory so deallocation and drop can release them. Handles carry
//! their size-class index (or large tag), so routing back needs no
//! side table and class blocks keep their full alignment.

use std::collections::HashMap;
use std::ptr::NonNull;

use crate::backing::{Backing, SystemBacking};
use crate::chunk::CHUNK_ALIGN;
use crate::error::AllocError;
use crate::handle::{Handle, Route, next_origin_tag};
use crate::layout::Layout;
use crate::pool::{Pool, PoolConfig};
use crate::traits::RawAllocator;

/// Alignment every size class guarantees: class sizes must be multiples
/// of this, and chunks are allocated at it.
pub const MIN_CLASS_ALIGN: usize = CHUNK_ALIGN;

/// Construction-time slab parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlabConfig {
    /// Ascending block sizes, each a multiple of [`MIN_CLASS_ALIGN`].
    pub size_classes: Vec<usize>,
    /// Requests larger than this bypass the pools. Must be at least
    /// the largest size class.
    pub large_threshold: usize,
    /// Initial blocks per chunk for every class pool.
    pub blocks_per_chunk: usize,
    /// Growth cap for every class pool.
    pub max_blocks_per_chunk: usize,
}

impl Default for SlabConfig {
    /// Geometric class progression, threshold at the largest class.
    fn default() -> Self {
        Self {
            size_classes: vec![16, 32, 64, 128, 256, 512, 1024],
            large_threshold: 1024,
            blocks_per_chunk: 64,
            max_blocks_per_chunk: 1024,
        }
    }
}

impl SlabConfig {
    fn validate(&self) -> Result<(), AllocError> {
        if self.size_classes.is_empty() {
            return Err(AllocError::InvalidConfig {
                reason: "at least one size class is required",
            });
        }
        if self.size_classes.len() > usize::from(u16::MAX) {
            return Err(AllocError::InvalidConfig {
                reason: "too many size classes",
            });
        }
        for pair in self.size_classes.windows(2) {
            if pair[1] <= pair[0] {
                return Err(AllocError::InvalidConfig {
                    reason: "size classes must be strictly ascending",
                });
            }
        }
        if self.size_classes.iter().any(|&c| c % MIN_CLASS_ALIGN != 0) {
            return Err(AllocError::InvalidConfig {
                reason: "size classes must be multiples of the class alignment",
            });
        }
        let largest = *self.size_classes.last().expect("non-empty");
        if self.large_threshold < largest {
            return Err(AllocError::InvalidConfig {
                reason: "large_threshold must be >= the largest size class",
            });
        }
        Ok(())
    }
}

/// Size-classed allocator with a direct backing path for large
/// requests.
///
/// Not safe for concurrent mutation; wrap in
/// [`LockedAllocator`](crate::locked::LockedAllocator) to share.
#[derive(Debug)]
pub struct Slab<B: Backing = SystemBacking> {
    classes: Vec<usize>,
    pools: Vec<Pool<B>>,
    large_threshold: usize,
    /// Directory of live large allocations: addr -> (size, align).
    /// Kept in all builds so large double frees are reported and drop
    /// can release outstanding blocks.
    large: HashMap<usize, (usize, usize)>,
    backing: B,
    origin: u64,
}

impl Slab<SystemBacking> {
    /// Slab over the system allocator.
    pub fn new(config: SlabConfig) -> Result<Self, AllocError> {
        Self::with_backing(SystemBacking, config)
    }
}

impl<B: Backing> Slab<B> {
    /// Slab over an injected backing; every class pool shares it.
    pub fn with_backing(backing: B, config: SlabConfig) -> Result<Self, AllocError> {
        config.validate()?;
        let mut pools = Vec::with_capacity(config.size_classes.len());
        for (index, &class_size) in config.size_classes.iter().enumerate() {
            let pool_config = PoolConfig {
                block_size: class_size,
                blocks_per_chunk: config.blocks_per_chunk,
                max_blocks_per_chunk: config.max_blocks_per_chunk,
            };
            pools.push(Pool::for_class(
                backing.clone(),
                pool_config,
                index as u16,
            )?);
        }
        Ok(Self {
            classes: config.size_classes,
            pools,
            large_threshold: config.large_threshold,
            large: HashMap::new(),
            backing,
            origin: next_origin_tag(),
        })
    }

    /// Index of the smallest class that can serve `layout`, or `None`
    /// when the request must take the large path.
    #[must_use]
    pub fn class_for(&self, layout: Layout) -> Option<usize> {
        if layout.size() > self.large_threshold || layout.align() > MIN_CLASS_ALIGN {
            return None;
        }
        let index = self.classes.partition_point(|&c| c < layout.size());
        (index < self.classes.len()).then_some(index)
    }

    /// Routes the request to its size class, or to the backing above
    /// the large threshold.
    pub fn allocate(&mut self, layout: Layout) -> Result<Handle, AllocError> {
        match self.class_for(layout) {
            Some(index) => self.pools[index].allocate(),
            None => self.allocate_large(layout),
        }
    }

    /// Routes the block back by the class index or large tag recorded
    /// in the handle.
    pub fn deallocate(&mut self, handle: Handle) -> Result<(), AllocError> {
        let addr = handle.addr();
        match handle.route() {
            Route::Class(index) => {
                let index = usize::from(index);
                if index >= self.pools.len() {
                    return Err(AllocError::ForeignHandle { addr });
                }
                self.pools[index].deallocate(handle)
            }
            Route::Large => {
                #[cfg(debug_assertions)]
                if !handle.verify(self.origin) {
                    return Err(AllocError::ForeignHandle { addr });
                }
                // The directory distinguishes a block this slab never
                // issued from one already freed in all builds.
                let Some((size, align)) = self.large.remove(&addr) else {
                    return Err(AllocError::DoubleFree { addr });
                };
                // SAFETY: recorded at allocation time from this
                // backing with exactly this size/align.
                unsafe { self.backing.raw_deallocate(handle.ptr(), size, align) };
                Ok(())
            }
            Route::Chunked => Err(AllocError::ForeignHandle { addr }),
        }
    }

    /// Live blocks across every class pool plus large allocations.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        let pooled: usize = self.pools.iter().map(Pool::live_blocks).sum();
        pooled + self.large.len()
    }

    /// Live allocations on the large path.
    #[must_use]
    pub fn live_large(&self) -> usize {
        self.large.len()
    }

    /// The configured size classes, ascending.
    #[must_use]
    pub fn size_classes(&self) -> &[usize] {
        &self.classes
    }

    /// The large-request threshold.
    #[must_use]
    pub fn large_threshold(&self) -> usize {
        self.large_threshold
    }

    fn allocate_large(&mut self, layout: Layout) -> Result<Handle, AllocError> {
        let (size, align) = (layout.size(), layout.align());
        let ptr = self.backing.raw_allocate(size, align)?;
        self.large.insert(ptr.as_ptr() as usize, (size, align));
        Ok(Handle::new(ptr, Route::Large, self.origin))
    }
}

impl<B: Backing> Drop for Slab<B> {
    fn drop(&mut self) {
        // Class chunks release through RawChunk; large blocks are ours
        // to return here.
        for (addr, (size, align)) in self.large.drain() {
            // SAFETY: every directory entry was allocated from this
            // backing with the recorded size/align and not yet freed.
            unsafe {
                let ptr = NonNull::new_unchecked(addr as *mut u8);
                self.backing.raw_deallocate(ptr, size, align);
            }
        }
    }
}

impl<B: Backing> RawAllocator for Slab<B> {
    fn allocate(&mut self, layout: Layout) -> Result<Handle, AllocError> {
        Slab::allocate(self, layout)
    }

    fn deallocate(&mut self, handle: Handle, _layout: Layout) -> Result<(), AllocError> {
        Slab::deallocate(self, handle)
    }
}
