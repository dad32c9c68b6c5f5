//! Opaque allocation handles.
//!
//! A handle is the token a caller must present to deallocate: the block
//! address plus the routing information recorded when it was allocated
//! (which size class served it, or whether it bypassed the pools). In
//! debug builds the handle additionally carries a blake3 fingerprint
//! keyed by the originating allocator's instance tag, so returning a
//! handle to the wrong allocator is detected instead of corrupting a
//! free list.
//!
//! Per handle the lifecycle is `Allocated -> Freed`, and `Freed` is
//! terminal: reuse of the same address later is a new handle identity.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a block must be routed back at deallocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Bump-allocated from an arena; individual deallocation is a no-op
    /// and the memory is reclaimed by `reset` or drop.
    Chunked,
    /// Served by the size-class pool with this index.
    Class(u16),
    /// Served directly by the backing (slab large path or the plain
    /// system allocator).
    Large,
}

/// Opaque reference to an allocated block.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    ptr: NonNull<u8>,
    route: Route,
    origin: u64,
    #[cfg(debug_assertions)]
    fingerprint: u64,
}

// SAFETY: a handle is an address-sized token plus routing metadata; it
// grants no access to the block by itself. Dereferencing the pointer
// requires the owning allocator and is the caller's obligation.
unsafe impl Send for Handle {}
// SAFETY: same reasoning; shared references to a handle only read it.
unsafe impl Sync for Handle {}

impl Handle {
    pub(crate) fn new(ptr: NonNull<u8>, route: Route, origin: u64) -> Self {
        Self {
            ptr,
            route,
            origin,
            #[cfg(debug_assertions)]
            fingerprint: fingerprint(origin, ptr.as_ptr() as usize),
        }
    }

    /// Pointer to the first byte of the block.
    #[must_use]
    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Block address as an integer.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Deallocation route recorded at allocation time.
    #[must_use]
    pub fn route(&self) -> Route {
        self.route
    }

    /// Instance tag of the allocator that minted this handle.
    /// Exposed for diagnostics; deallocation routing never trusts it
    /// alone.
    #[must_use]
    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Checks that this handle was minted by the allocator with the
    /// given instance tag and has not been tampered with.
    #[cfg(debug_assertions)]
    pub(crate) fn verify(&self, origin: u64) -> bool {
        self.origin == origin && self.fingerprint == fingerprint(origin, self.addr())
    }
}

static NEXT_ORIGIN_TAG: AtomicU64 = AtomicU64::new(1);

/// Mints a process-unique instance tag for an allocator.
pub(crate) fn next_origin_tag() -> u64 {
    NEXT_ORIGIN_TAG.fetch_add(1, Ordering::Relaxed)
}

/// Handle fingerprint: blake3 over the origin tag and block address,
/// truncated to 64 bits.
#[cfg(debug_assertions)]
fn fingerprint(origin: u64, addr: usize) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&origin.to_le_bytes());
    hasher.update(&addr.to_le_bytes());
    let hash = hasher.finalize();
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().expect("hash is 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dangling() -> NonNull<u8> {
        NonNull::<u64>::dangling().cast()
    }

    #[test]
    fn test_origin_tags_are_unique() {
        let a = next_origin_tag();
        let b = next_origin_tag();
        assert_ne!(a, b);
    }

    #[test]
    fn test_handle_records_route_and_addr() {
        let ptr = dangling();
        let handle = Handle::new(ptr, Route::Class(3), next_origin_tag());
        assert_eq!(handle.route(), Route::Class(3));
        assert_eq!(handle.addr(), ptr.as_ptr() as usize);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_verify_rejects_wrong_origin() {
        let origin = next_origin_tag();
        let handle = Handle::new(dangling(), Route::Large, origin);
        assert!(handle.verify(origin));
        assert!(!handle.verify(origin + 1));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_fingerprint_depends_on_addr_and_origin() {
        assert_ne!(fingerprint(1, 0x1000), fingerprint(1, 0x1008));
        assert_ne!(fingerprint(1, 0x1000), fingerprint(2, 0x1000));
    }
}
