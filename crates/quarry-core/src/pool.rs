//! Fixed-size block pool with an intrusive free list.
//!
//! Free blocks host a [`FreeNode`] in their first bytes, forming a
//! singly linked, acyclic chain from `free_head` to null. Allocation
//! pops the head; deallocation pushes the block back. After warm-up
//! both are O(1) with no backing calls. When the free list runs dry the
//! pool carves a fresh chunk into blocks, doubling the blocks per chunk
//! each time up to a configured cap.
//!
//! Debug builds track the set of free block addresses (so a double free
//! is reported, not silently corrupting the list) and verify the
//! handle's origin fingerprint. Release builds compile both checks out;
//! a double free or foreign handle is then undefined behavior, the
//! documented cost of the lean fast path.

use std::ptr::NonNull;

#[cfg(debug_assertions)]
use std::collections::HashSet;

use crate::backing::{Backing, SystemBacking};
use crate::chunk::{CHUNK_ALIGN, RawChunk};
use crate::error::AllocError;
use crate::handle::{Handle, Route, next_origin_tag};
use crate::layout::Layout;
use crate::traits::RawAllocator;

/// Intrusive free-list header, written into the first bytes of a block
/// while it is free and overwritten by caller data once allocated.
#[derive(Debug, Clone, Copy)]
struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

/// Smallest legal block size: a block must be able to host a
/// [`FreeNode`] while free.
pub const MIN_BLOCK_SIZE: usize = size_of::<FreeNode>();

/// Construction-time pool parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Size of every block served by the pool, in bytes.
    pub block_size: usize,
    /// Blocks carved from the first chunk.
    pub blocks_per_chunk: usize,
    /// Growth cap: later chunks double the block count until here.
    pub max_blocks_per_chunk: usize,
}

impl PoolConfig {
    /// Default geometry: start at 64 blocks per chunk, double up to 1024.
    #[must_use]
    pub const fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks_per_chunk: 64,
            max_blocks_per_chunk: 1024,
        }
    }

    /// Fixed geometry: every chunk holds exactly `blocks_per_chunk`
    /// blocks, no growth.
    #[must_use]
    pub const fn fixed(block_size: usize, blocks_per_chunk: usize) -> Self {
        Self {
            block_size,
            blocks_per_chunk,
            max_blocks_per_chunk: blocks_per_chunk,
        }
    }

    fn validate(&self) -> Result<(), AllocError> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(AllocError::InvalidConfig {
                reason: "block_size too small to host the free-list node",
            });
        }
        if self.block_size % align_of::<FreeNode>() != 0 {
            return Err(AllocError::InvalidConfig {
                reason: "block_size must be a multiple of the free-list node alignment",
            });
        }
        if self.blocks_per_chunk == 0 {
            return Err(AllocError::InvalidConfig {
                reason: "blocks_per_chunk must be > 0",
            });
        }
        if self.max_blocks_per_chunk < self.blocks_per_chunk {
            return Err(AllocError::InvalidConfig {
                reason: "max_blocks_per_chunk must be >= blocks_per_chunk",
            });
        }
        Ok(())
    }
}

/// Fixed-size block allocator.
///
/// Every block is in exactly one of two states: free (reachable from
/// `free_head`) or allocated (owned by a caller) -- never both, never
/// neither while chunks are live.
#[derive(Debug)]
pub struct Pool<B: Backing = SystemBacking> {
    block_size: usize,
    free_head: Option<NonNull<FreeNode>>,
    chunks: Vec<RawChunk<B>>,
    next_chunk_blocks: usize,
    max_chunk_blocks: usize,
    free_blocks: usize,
    live_blocks: usize,
    class: u16,
    backing: B,
    origin: u64,
    #[cfg(debug_assertions)]
    free_set: HashSet<usize>,
}

// SAFETY: `free_head` only ever points into chunks the pool exclusively
// owns; moving the pool between threads moves that ownership with it.
unsafe impl<B: Backing + Send> Send for Pool<B> {}

impl Pool<SystemBacking> {
    /// Pool over the system allocator.
    pub fn new(config: PoolConfig) -> Result<Self, AllocError> {
        Self::with_backing(SystemBacking, config)
    }
}

impl<B: Backing> Pool<B> {
    /// Pool over an injected backing.
    pub fn with_backing(backing: B, config: PoolConfig) -> Result<Self, AllocError> {
        Self::for_class(backing, config, 0)
    }

    /// Pool stamped with a slab size-class index; handles it mints
    /// carry `Route::Class(class)` so the slab can route them back.
    pub(crate) fn for_class(backing: B, config: PoolConfig, class: u16) -> Result<Self, AllocError> {
        config.validate()?;
        Ok(Self {
            block_size: config.block_size,
            free_head: None,
            chunks: Vec::new(),
            next_chunk_blocks: config.blocks_per_chunk,
            max_chunk_blocks: config.max_blocks_per_chunk,
            free_blocks: 0,
            live_blocks: 0,
            class,
            backing,
            origin: next_origin_tag(),
            #[cfg(debug_assertions)]
            free_set: HashSet::new(),
        })
    }

    /// Size of every block served by this pool.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Largest alignment every block is guaranteed to satisfy.
    #[must_use]
    pub fn block_align(&self) -> usize {
        // Blocks sit at multiples of block_size from a CHUNK_ALIGN'd
        // base, so the guarantee is the smaller power of two.
        let size_align = 1usize << self.block_size.trailing_zeros();
        size_align.min(CHUNK_ALIGN)
    }

    /// Pops a free block, carving a new chunk first if the list is dry.
    /// Fails with `OutOfMemory` only on chunk allocation failure.
    pub fn allocate(&mut self) -> Result<Handle, AllocError> {
        if self.free_head.is_none() {
            self.grow()?;
        }
        let node = self
            .free_head
            .ok_or(AllocError::OutOfMemory {
                size: self.block_size,
                align: self.block_align(),
            })?;
        // SAFETY: node is reachable from free_head, so it points into a
        // live chunk and holds a valid FreeNode.
        self.free_head = unsafe { node.as_ref().next };
        self.free_blocks -= 1;
        self.live_blocks += 1;
        #[cfg(debug_assertions)]
        self.free_set.remove(&(node.as_ptr() as usize));
        Ok(Handle::new(node.cast(), Route::Class(self.class), self.origin))
    }

    /// Pushes a block back onto the free list.
    pub fn deallocate(&mut self, handle: Handle) -> Result<(), AllocError> {
        #[cfg(debug_assertions)]
        {
            let addr = handle.addr();
            if !handle.verify(self.origin) || !self.owns_block(addr) {
                return Err(AllocError::ForeignHandle { addr });
            }
            if !self.free_set.insert(addr) {
                return Err(AllocError::DoubleFree { addr });
            }
        }
        let node = handle.ptr().cast::<FreeNode>();
        // SAFETY: the block belongs to this pool, is at least
        // MIN_BLOCK_SIZE bytes, and is aligned for FreeNode.
        unsafe {
            node.as_ptr().write(FreeNode {
                next: self.free_head,
            });
        }
        self.free_head = Some(node);
        self.free_blocks += 1;
        self.live_blocks = self.live_blocks.saturating_sub(1);
        Ok(())
    }

    /// Blocks currently owned by callers.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Blocks currently on the free list.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    /// Chunks acquired from the backing so far.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// True if `addr` is a block boundary inside one of this pool's
    /// chunks.
    #[cfg(debug_assertions)]
    fn owns_block(&self, addr: usize) -> bool {
        self.chunks
            .iter()
            .any(|c| c.contains(addr) && (addr - c.base_addr()) % self.block_size == 0)
    }

    /// Carves a fresh chunk into blocks and threads them into the free
    /// list.
    fn grow(&mut self) -> Result<(), AllocError> {
        let blocks = self.next_chunk_blocks;
        let bytes = self
            .block_size
            .checked_mul(blocks)
            .ok_or(AllocError::InvalidConfig {
                reason: "chunk byte size overflows",
            })?;
        let mut chunk = RawChunk::new(&self.backing, bytes, CHUNK_ALIGN)?;

        while let Some(ptr) = chunk.try_bump(self.block_size, 1) {
            let node = ptr.cast::<FreeNode>();
            // SAFETY: the block was just carved from the chunk and is
            // large and aligned enough for a FreeNode.
            unsafe {
                node.as_ptr().write(FreeNode {
                    next: self.free_head,
                });
            }
            self.free_head = Some(node);
            self.free_blocks += 1;
            #[cfg(debug_assertions)]
            self.free_set.insert(node.as_ptr() as usize);
        }

        self.chunks.push(chunk);
        self.next_chunk_blocks = (blocks.saturating_mul(2)).min(self.max_chunk_blocks);
        Ok(())
    }
}

impl<B: Backing> RawAllocator for Pool<B> {
    /// The layout must fit the pool's fixed block geometry; anything
    /// else is the caller asking the wrong allocator.
    fn allocate(&mut self, layout: Layout) -> Result<Handle, AllocError> {
        if layout.size() > self.block_size || layout.align() > self.block_align() {
            return Err(AllocError::InvalidLayout {
                size: layout.size(),
                align: layout.align(),
            });
        }
        Pool::allocate(self)
    }

    fn deallocate(&mut self, handle: Handle, _layout: Layout) -> Result<(), AllocError> {
        Pool::deallocate(self, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::CountingBacking;

    #[test]
    fn test_undersized_block_rejected_at_construction() {
        let err = Pool::new(PoolConfig::new(MIN_BLOCK_SIZE - 1)).unwrap_err();
        assert!(matches!(err, AllocError::InvalidConfig { .. }));
    }

    #[test]
    fn test_misaligned_block_size_rejected() {
        let err = Pool::new(PoolConfig::new(MIN_BLOCK_SIZE + 1)).unwrap_err();
        assert!(matches!(err, AllocError::InvalidConfig { .. }));
    }

    #[test]
    fn test_zero_blocks_per_chunk_rejected() {
        let err = Pool::new(PoolConfig::fixed(32, 0)).unwrap_err();
        assert!(matches!(err, AllocError::InvalidConfig { .. }));
    }

    #[test]
    fn test_allocate_deallocate_balance() {
        let mut pool = Pool::new(PoolConfig::fixed(32, 8)).unwrap();
        let handles: Vec<Handle> = (0..20).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(pool.live_blocks(), 20);
        for handle in &handles[..5] {
            pool.deallocate(*handle).unwrap();
        }
        assert_eq!(pool.live_blocks(), 15);
        assert_eq!(pool.free_blocks(), 24 - 15);
    }

    #[test]
    fn test_no_address_served_twice_while_live() {
        let mut pool = Pool::new(PoolConfig::fixed(16, 4)).unwrap();
        let mut live: Vec<usize> = Vec::new();
        for _ in 0..64 {
            let handle = pool.allocate().unwrap();
            assert!(!live.contains(&handle.addr()), "aliased live block");
            live.push(handle.addr());
        }
    }

    #[test]
    fn test_freed_block_reused_lifo() {
        let mut pool = Pool::new(PoolConfig::fixed(32, 8)).unwrap();
        let handle = pool.allocate().unwrap();
        let addr = handle.addr();
        pool.deallocate(handle).unwrap();
        let again = pool.allocate().unwrap();
        assert_eq!(again.addr(), addr);
    }

    #[test]
    fn test_chunk_growth_doubles_until_cap() {
        let backing = CountingBacking::new();
        let config = PoolConfig {
            block_size: 32,
            blocks_per_chunk: 4,
            max_blocks_per_chunk: 8,
        };
        let mut pool = Pool::with_backing(backing.clone(), config).unwrap();
        // Chunks carve 4, then 8, then 8 blocks.
        for _ in 0..20 {
            pool.allocate().unwrap();
        }
        assert_eq!(pool.chunk_count(), 3);
        assert_eq!(backing.bytes_allocated(), (4 + 8 + 8) * 32);
    }

    #[test]
    fn test_warm_pool_makes_no_backing_calls() {
        let backing = CountingBacking::new();
        let mut pool = Pool::with_backing(backing.clone(), PoolConfig::fixed(64, 16)).unwrap();
        let handles: Vec<Handle> = (0..16).map(|_| pool.allocate().unwrap()).collect();
        let after_warmup = backing.allocations();
        for handle in handles {
            pool.deallocate(handle).unwrap();
        }
        for _ in 0..16 {
            pool.allocate().unwrap();
        }
        assert_eq!(backing.allocations(), after_warmup);
    }

    #[test]
    fn test_blocks_are_class_aligned() {
        let mut pool = Pool::new(PoolConfig::fixed(64, 8)).unwrap();
        for _ in 0..8 {
            let handle = pool.allocate().unwrap();
            assert_eq!(handle.addr() % pool.block_align(), 0);
        }
        assert_eq!(pool.block_align(), CHUNK_ALIGN);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_double_free_detected() {
        let mut pool = Pool::new(PoolConfig::fixed(32, 8)).unwrap();
        let handle = pool.allocate().unwrap();
        pool.deallocate(handle).unwrap();
        assert_eq!(
            pool.deallocate(handle),
            Err(AllocError::DoubleFree {
                addr: handle.addr()
            })
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_foreign_handle_detected() {
        let mut a = Pool::new(PoolConfig::fixed(32, 8)).unwrap();
        let mut b = Pool::new(PoolConfig::fixed(32, 8)).unwrap();
        let handle = a.allocate().unwrap();
        assert_eq!(
            b.deallocate(handle),
            Err(AllocError::ForeignHandle {
                addr: handle.addr()
            })
        );
        a.deallocate(handle).unwrap();
    }

    #[test]
    fn test_trait_allocate_rejects_oversized_layout() {
        let mut pool = Pool::new(PoolConfig::fixed(32, 8)).unwrap();
        let too_big = Layout::from_size_align(64, 8).unwrap();
        assert!(matches!(
            RawAllocator::allocate(&mut pool, too_big),
            Err(AllocError::InvalidLayout { .. })
        ));
        let fits = Layout::from_size_align(24, 8).unwrap();
        let handle = RawAllocator::allocate(&mut pool, fits).unwrap();
        RawAllocator::deallocate(&mut pool, handle, fits).unwrap();
    }
}
