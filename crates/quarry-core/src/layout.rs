//! Allocation layout: requested size and alignment.
//!
//! A validated value type created per request and never mutated. The
//! constructor enforces the two invariants every allocator in this crate
//! relies on: `align` is a power of two, and rounding `size` up to
//! `align` cannot overflow an `isize`.

use crate::error::AllocError;

/// Size and alignment of a requested allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    size: usize,
    align: usize,
}

impl Layout {
    /// Creates a layout, validating the size/align combination.
    pub fn from_size_align(size: usize, align: usize) -> Result<Self, AllocError> {
        if !align.is_power_of_two() {
            return Err(AllocError::InvalidLayout { size, align });
        }
        // Rounded-up size must stay below isize::MAX so offset
        // arithmetic on the resulting block cannot overflow.
        if size > isize::MAX as usize - (align - 1) {
            return Err(AllocError::InvalidLayout { size, align });
        }
        Ok(Self { size, align })
    }

    /// Layout of a value of type `T`. Valid by construction.
    #[must_use]
    pub const fn for_type<T>() -> Self {
        Self {
            size: size_of::<T>(),
            align: align_of::<T>(),
        }
    }

    /// Requested size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Requested alignment in bytes. Always a power of two, `>= 1`.
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }
}

/// Rounds `addr` up to the next multiple of `align`.
///
/// `align` must be a power of two and `addr + align - 1` must not
/// overflow (checked in debug builds). The result satisfies
/// `out >= addr && out % align == 0 && out - addr < align`.
#[must_use]
pub const fn align_up(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    debug_assert!(addr <= usize::MAX - (align - 1));
    (addr + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_size_align_valid() {
        let layout = Layout::from_size_align(24, 8).unwrap();
        assert_eq!(layout.size(), 24);
        assert_eq!(layout.align(), 8);
    }

    #[test]
    fn test_align_must_be_power_of_two() {
        assert_eq!(
            Layout::from_size_align(16, 3),
            Err(AllocError::InvalidLayout { size: 16, align: 3 })
        );
        assert_eq!(
            Layout::from_size_align(16, 0),
            Err(AllocError::InvalidLayout { size: 16, align: 0 })
        );
    }

    #[test]
    fn test_size_overflow_rejected() {
        assert!(Layout::from_size_align(usize::MAX, 16).is_err());
        assert!(Layout::from_size_align(isize::MAX as usize, 2).is_err());
    }

    #[test]
    fn test_zero_size_is_valid() {
        assert!(Layout::from_size_align(0, 1).is_ok());
    }

    #[test]
    fn test_for_type() {
        let layout = Layout::for_type::<u64>();
        assert_eq!(layout.size(), 8);
        assert_eq!(layout.align(), align_of::<u64>());
    }

    #[test]
    fn test_align_up_contract() {
        for align in [1usize, 2, 4, 8, 16, 64, 4096] {
            for addr in [0usize, 1, 7, 15, 16, 17, 1000, 4095, 4096] {
                let out = align_up(addr, align);
                assert!(out >= addr);
                assert_eq!(out % align, 0);
                assert!(out - addr < align);
            }
        }
    }

    #[test]
    fn test_align_up_identity_when_aligned() {
        assert_eq!(align_up(64, 16), 64);
        assert_eq!(align_up(0, 4096), 0);
    }
}
