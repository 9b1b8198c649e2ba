//! The boundary tag stored at both ends of every block.

/// The bit marking a block as allocated.
///
/// Block sizes are always a multiple of the doubleword size `8`, so the lower
/// three bits of a tag are free for flags. Only the lowest one is used.
const USED_BIT: u32 = 0b1;

/// The mask selecting the size part of a tag.
const SIZE_MASK: u32 = !0b111;

/// A single boundary tag (header or footer) of a block.
///
/// A tag packs the total size of the block (including header and footer) and
/// an "allocated"-flag into a single 32-bit word:
/// ```text
/// 31                                3  2  1  0
/// +----------------------------------+--+--+--+
/// |          size (multiple of 8)    | 0| 0| a|
/// +----------------------------------+--+--+--+
/// ```
/// The header and the footer of a well-formed block always hold the same
/// `Entry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);
impl Entry {
    /// Create a tag for a free block of the given total size.
    ///
    /// # Panics
    /// This function panics if `size` is not a multiple of `8` or does not fit
    /// into the tag.
    pub const fn free(size: usize) -> Self {
        Self::pack(size, false)
    }

    /// Create a tag for an allocated block of the given total size.
    ///
    /// # Panics
    /// This function panics if `size` is not a multiple of `8` or does not fit
    /// into the tag.
    pub const fn used(size: usize) -> Self {
        Self::pack(size, true)
    }

    const fn pack(size: usize, used: bool) -> Self {
        assert!(size % 8 == 0, "block size must be a multiple of 8");
        assert!(size <= SIZE_MASK as usize, "block size exceeds the tag");
        Self(size as u32 | if used { USED_BIT } else { 0 })
    }

    /// The total size of the block in bytes, header and footer included.
    pub const fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    /// Query, whether the block is free.
    pub const fn is_free(self) -> bool {
        self.0 & USED_BIT == 0
    }

    /// Query, whether the block is allocated.
    pub const fn is_used(self) -> bool {
        !self.is_free()
    }

    /// The in-memory representation of this tag.
    pub const fn as_raw(self) -> [u8; 4] {
        self.0.to_ne_bytes()
    }

    /// Reconstruct a tag from its in-memory representation.
    pub const fn from_raw(raw: [u8; 4]) -> Self {
        Self(u32::from_ne_bytes(raw))
    }
}
