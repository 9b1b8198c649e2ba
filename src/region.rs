//! The backing store of the heap.
//!
//! A [`Region`] is a contiguous range of bytes, which only ever grows at its
//! upper end (like the classic `sbrk()` program break). The allocator fully
//! controls every byte it has been granted. Addresses inside a region are
//! plain offsets from its start, so a region is free to move its memory (as
//! [`VecRegion`] does on growth) without invalidating the heap layout.
//!
//! The bytes of a region are only ever accessed through the raw pointer
//! returned by [`Region::as_ptr()`]. No reference spanning the whole region is
//! created, so pointers into payloads handed out by the global allocator stay
//! valid across later allocator calls.
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::ptr;

/// The default upper limit of a [`VecRegion`]: 20 MiB.
pub const MAX_HEAP: usize = 20 * (1 << 20);

/// A growable byte range supplying address space to the allocator.
///
/// Implementations hand out memory in a strictly monotonic fashion: every
/// successful [`grow()`](Region::grow) returns the previous break, which is
/// exactly the end of all memory granted so far.
///
/// # Safety
/// The pointer returned by [`as_ptr()`](Region::as_ptr) must be valid for
/// reads and writes of [`hi()`](Region::hi) bytes until the next call to
/// `grow()` or `reset()`, and writes through it must be permitted although
/// it is obtained from a shared reference (i.e. the memory lives in an
/// [`UnsafeCell`]). Memory granted before must keep its contents on growth.
pub unsafe trait Region {
    /// Grow the region by `increment` bytes.
    ///
    /// On success the old break (i.e. the offset of the first new byte) is
    /// returned. If the region cannot supply the requested amount of memory,
    /// `None` is returned and the region is left unchanged. The allocator only
    /// ever requests multiples of `8`.
    fn grow(&mut self, increment: usize) -> Option<usize>;

    /// Release all granted memory, moving the break back to the start.
    fn reset(&mut self);

    /// The offset of the first granted byte.
    fn lo(&self) -> usize {
        0
    }

    /// The current break, i.e. one past the last granted byte.
    fn hi(&self) -> usize;

    /// The number of bytes currently granted.
    fn size(&self) -> usize {
        self.hi() - self.lo()
    }

    /// The address of the first byte of the region.
    fn as_ptr(&self) -> *mut u8;
}

/// A fixed-capacity region backed by an inline array of `N` bytes.
///
/// The whole array is reserved up front, but only the part below the break is
/// handed out. Since the array is zero-initialized and the constructor is a
/// `const fn`, a `static` holding this region ends up in `.bss` and does not
/// occupy space in the binary image. The array is aligned to `8`, so every
/// payload offset handed out by the allocator is a properly aligned address.
#[repr(C, align(8))]
pub struct StaticRegion<const N: usize> {
    memory: UnsafeCell<[u8; N]>,
    brk: usize,
}
// SAFETY: the memory is only written through raw pointers, which requires
// `unsafe` code on the caller's side; the break only changes through `&mut`.
unsafe impl<const N: usize> Sync for StaticRegion<N> {}
impl<const N: usize> StaticRegion<N> {
    /// Create a new, empty region with a capacity of `N` bytes.
    ///
    /// # Panics
    /// This function panics if `N` is not divisible by `8`.
    pub const fn new() -> Self {
        assert!(N % 8 == 0, "region size has to be divisible by 8");
        Self {
            memory: UnsafeCell::new([0; N]),
            brk: 0,
        }
    }

    /// The total capacity of the region.
    pub const fn capacity(&self) -> usize {
        N
    }
}
impl<const N: usize> Default for StaticRegion<N> {
    fn default() -> Self {
        Self::new()
    }
}
unsafe impl<const N: usize> Region for StaticRegion<N> {
    fn grow(&mut self, increment: usize) -> Option<usize> {
        let old = self.brk;
        let new = old.checked_add(increment).filter(|&new| new <= N)?;
        self.brk = new;
        Some(old)
    }

    fn reset(&mut self) {
        self.brk = 0;
    }

    fn hi(&self) -> usize {
        self.brk
    }

    fn as_ptr(&self) -> *mut u8 {
        self.memory.get().cast()
    }
}

/// A region over memory owned by someone else.
///
/// Only the break is kept in this value. The memory is addressed through a
/// base pointer, that the owner of the memory re-binds before every use. This
/// keeps the memory out of any `&mut`-borrow of the allocator, which is what
/// [`Allocator`](crate::Allocator) needs: the payloads it hands out must stay
/// valid while the allocator itself is borrowed mutably under its lock.
pub(crate) struct ArenaRegion {
    base: *mut u8,
    capacity: usize,
    brk: usize,
}
// SAFETY: the base pointer is only dereferenced by the allocator owning this
// region, which is serialized by the lock of `Allocator`.
unsafe impl Send for ArenaRegion {}
impl ArenaRegion {
    /// Create an unbound region of `capacity` bytes.
    pub(crate) const fn new(capacity: usize) -> Self {
        Self {
            base: ptr::null_mut(),
            capacity,
            brk: 0,
        }
    }

    /// Point the region at its memory.
    ///
    /// # Safety
    /// `base` has to be valid for reads and writes of `capacity` bytes,
    /// derived from an [`UnsafeCell`] and aligned to `8`. If the region was
    /// bound before, `base` has to address the same memory.
    pub(crate) unsafe fn bind(&mut self, base: *mut u8) {
        self.base = base;
    }
}
unsafe impl Region for ArenaRegion {
    fn grow(&mut self, increment: usize) -> Option<usize> {
        let old = self.brk;
        let new = old
            .checked_add(increment)
            .filter(|&new| new <= self.capacity)?;
        self.brk = new;
        Some(old)
    }

    fn reset(&mut self) {
        self.brk = 0;
    }

    fn hi(&self) -> usize {
        self.brk
    }

    fn as_ptr(&self) -> *mut u8 {
        self.base
    }
}

/// A region backed by a vector, which is grown on demand up to a limit.
///
/// Newly granted bytes are zeroed.
#[derive(Debug)]
pub struct VecRegion {
    memory: Vec<UnsafeCell<u8>>,
    limit: usize,
}
impl VecRegion {
    /// Create an empty region, that may grow up to [`MAX_HEAP`] bytes.
    pub const fn new() -> Self {
        Self::with_limit(MAX_HEAP)
    }

    /// Create an empty region, that may grow up to `limit` bytes.
    ///
    /// # Panics
    /// This function panics if `limit` is not divisible by `8`.
    pub const fn with_limit(limit: usize) -> Self {
        assert!(limit % 8 == 0, "region limit has to be divisible by 8");
        Self {
            memory: Vec::new(),
            limit,
        }
    }

    /// The maximum number of bytes this region will ever grant.
    pub const fn limit(&self) -> usize {
        self.limit
    }
}
impl Default for VecRegion {
    fn default() -> Self {
        Self::new()
    }
}
unsafe impl Region for VecRegion {
    fn grow(&mut self, increment: usize) -> Option<usize> {
        let old = self.memory.len();
        let new = old.checked_add(increment).filter(|&new| new <= self.limit)?;
        self.memory.resize_with(new, || UnsafeCell::new(0));
        Some(old)
    }

    fn reset(&mut self) {
        self.memory.clear();
    }

    fn hi(&self) -> usize {
        self.memory.len()
    }

    fn as_ptr(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.memory.as_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::{ArenaRegion, Region, StaticRegion, VecRegion};
    use core::cell::UnsafeCell;

    #[test]
    fn static_region_grows_monotonically() {
        let mut region = StaticRegion::<64>::new();
        assert_eq!(region.size(), 0);
        assert_eq!(region.grow(16), Some(0));
        assert_eq!(region.grow(32), Some(16));
        assert_eq!(region.hi(), 48);
        assert_eq!(region.capacity(), 64);
    }

    #[test]
    fn static_region_exhaustion() {
        let mut region = StaticRegion::<32>::new();
        assert_eq!(region.grow(24), Some(0));
        assert_eq!(region.grow(16), None);
        assert_eq!(region.size(), 24, "failed growth must not change the break");
        assert_eq!(region.grow(8), Some(24));
    }

    #[test]
    fn static_region_is_aligned() {
        let region = StaticRegion::<32>::new();
        assert_eq!(region.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn reset_releases_everything() {
        let mut region = VecRegion::with_limit(64);
        region.grow(40).unwrap();
        unsafe { region.as_ptr().write(0xaa) };
        region.reset();
        assert_eq!(region.size(), 0);
        assert_eq!(region.grow(8), Some(0));
        assert_eq!(unsafe { region.as_ptr().read() }, 0, "regrown memory is zeroed");
    }

    #[test]
    fn vec_region_keeps_contents_on_growth() {
        let mut region = VecRegion::new();
        region.grow(8).unwrap();
        unsafe { region.as_ptr().add(7).write(0x55) };
        region.grow(1 << 16).unwrap();
        assert_eq!(unsafe { region.as_ptr().add(7).read() }, 0x55);
    }

    #[test]
    fn vec_region_respects_limit() {
        let mut region = VecRegion::with_limit(16);
        assert_eq!(region.grow(24), None);
        assert_eq!(region.grow(16), Some(0));
        assert_eq!(region.grow(usize::MAX), None);
    }

    #[test]
    fn arena_region_addresses_bound_memory() {
        let memory = UnsafeCell::new([0u64; 4]);
        let mut region = ArenaRegion::new(32);
        unsafe { region.bind(memory.get().cast()) };

        assert_eq!(region.grow(16), Some(0));
        assert_eq!(region.grow(24), None);
        assert_eq!(region.as_ptr(), memory.get().cast::<u8>());
        region.reset();
        assert_eq!(region.size(), 0);
    }

    #[test]
    #[should_panic(expected = "divisible by 8")]
    fn odd_static_region() {
        let _region = StaticRegion::<30>::new();
    }
}
