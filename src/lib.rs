//! Boundary-tag heap allocator
//!
//! This crate implements a classic implicit-free-list allocator: a single,
//! contiguous heap region is divided into blocks, each carrying its size and
//! allocation state in a _boundary tag_ at both of its ends. Free space is
//! found by walking the blocks (first-fit or next-fit), a free block is split
//! if the remainder is large enough, and freed blocks are immediately merged
//! with free neighbours. The heap grows on demand by asking its backing
//! [`Region`] for more memory.
//!
//! The crate is `#![no_std]` and offers three layers:
//! - [`RawAllocator`]: the engine, working on payload offsets inside a region.
//! - [`Heap`]: the engine plus an allocation index, that identifies every
//!   allocation by a sequence number ([`BlockId`]) and validates every use of
//!   such an id.
//! - [`Allocator`]: a [`core::alloc::GlobalAlloc`] on top of a statically
//!   sized region, usable as the `#[global_allocator]`.
//!
//! # Usage
//! ```
//! use tagalloc::{Config, FitPolicy, Heap, VecRegion};
//!
//! let config = Config::new().with_policy(FitPolicy::NextFit);
//! let mut heap = Heap::new(VecRegion::new(), config).unwrap();
//!
//! let a = heap.allocate(100).unwrap().unwrap();
//! let b = heap.allocate(100).unwrap().unwrap();
//! heap.free(a).unwrap();
//! heap.free(b).unwrap();
//!
//! // both blocks (and the rest of the heap) were merged into a single block
//! assert_eq!(heap.blocks().count(), 1);
//! assert_eq!(heap.check(), Ok(()));
//! ```
//! As a global allocator (here with a heap of 64K):
//! ```no_run
//! #[global_allocator]
//! static ALLOCATOR: tagalloc::Allocator<65536> = tagalloc::Allocator::new();
//!
//! extern crate alloc;
//! ```
//!
//! # Implementation
//! Every block consists of a 4 byte header, the payload and a 4 byte footer.
//! Header and footer hold the same tag: the total block size (always a
//! multiple of 8) and an allocated-bit. The heap starts with an allocated
//! _prologue_ block without payload and ends with an allocated _epilogue_
//! header of size 0, so that no block ever has to special-case the heap
//! boundaries. The basic algorithm is as follows:
//! 1.  The heap is initialized with the sentinels and a single free block of
//!     the chunk size (in this example 48 bytes).
//!     ```text
//!     pad  8/a  8/a  48/f ......................... 48/f 0/a
//!     ^--- ^-------- ^------------------------------------ ^--
//!     PAD  PROLOGUE  FREE size = 48                        EPILOGUE
//!     ```
//! 2.  A block of 8 bytes is allocated. The request is rounded up to a block
//!     size: 8 bytes of header and footer are added and the sum is rounded up
//!     to a multiple of 8, which gives 16. The free block is split, since the
//!     remainder of 32 bytes can form a block on its own.
//!     ```text
//!     pad  8/a  8/a  16/a .. 16/a 32/f ........... 32/f 0/a
//!                    ^----------- ^--------------------
//!                    USED size=16 FREE size = 32
//!     ```
//! 3.  A block of 20 bytes is allocated (block size 32). It consumes the whole
//!     free block, as there is no remainder.
//! 4.  A block of 1 byte is allocated. No free block is large enough, so the
//!     heap is extended by at least one chunk: the new free block starts where
//!     the old epilogue was and a new epilogue is written behind it. Then the
//!     request is placed into the new block.
//! 5.  The block of step 2 is freed. Its header and footer are rewritten with
//!     the allocated-bit cleared. The previous block (the prologue) and the
//!     next block (the block of step 3) are both allocated, so nothing else
//!     happens.
//! 6.  The block of step 3 is freed. Now the _previous_ block is free as well:
//!     its size is found by reading its footer, which sits directly in front
//!     of the header of the freed block. Both blocks are merged into a single
//!     free block of 48 bytes by rewriting the header of the previous block and
//!     the footer of the freed block. If the next block was free as well, it
//!     would be merged in the same way. This keeps the invariant, that no two
//!     free blocks are ever adjacent, in constant time.
//!
//! The free-space search either starts at the first block every time
//! ([`FitPolicy::FirstFit`]), or resumes after the most recent placement and
//! wraps around at the end of the heap ([`FitPolicy::NextFit`]).
//!
//! The allocator logs through the [`log`]-facade. The global allocator
//! [`Allocator`] is an exception: it never logs, as a logger, that allocates,
//! would dead-lock on it.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod config;
mod error;
mod heap;
mod index;
mod raw_allocator;
mod region;

pub use config::{Config, CHUNK_SIZE};
pub use error::Error;
pub use heap::Heap;
pub use index::{AllocationIndex, BlockId};
pub use raw_allocator::{
    BlockInfo, Entry, FitPolicy, Inconsistency, Payload, RawAllocator, Stats, DSIZE, MIN_BLOCK,
    WSIZE,
};
pub use region::{Region, StaticRegion, VecRegion, MAX_HEAP};

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::{mem, ptr};
use region::ArenaRegion;

/// The memory of an [`Allocator`].
///
/// It is kept apart from the allocator state behind the lock, so that locking
/// the allocator never borrows the memory handed out to the program.
#[repr(C, align(8))]
struct Arena<const N: usize>(UnsafeCell<[u8; N]>);

/// The memory allocator usable as `#[global_allocator]`.
///
/// The heap memory usage is statically limited to `N` bytes, which are part of
/// the static memory of the program. The heap grows inside of these `N` bytes
/// by chunks of at most [`CHUNK_SIZE`] bytes.
///
/// Its usage is simple: just copy and paste the following in the binary crate
/// you're developing. The memory size of the heap is `4096` or 4K in this
/// example. Adjust that value to your needs.
/// ```no_run
/// #[global_allocator]
/// static ALLOCATOR: tagalloc::Allocator<4096> = tagalloc::Allocator::new();
/// ```
/// Blocks are aligned to `8`. Allocations with a larger alignment reserve
/// `align` additional bytes and are shifted to the next aligned address inside
/// of their block. The distance to the start of the block is stored in the
/// word in front of the returned address.
///
/// The allocator does not log, regardless of the installed logger.
pub struct Allocator<const N: usize> {
    arena: Arena<N>,
    raw: spin::Mutex<RawAllocator<ArenaRegion>>,
}
// SAFETY: the arena is only accessed by the allocator with its lock held and
// by the program through the blocks handed out to it.
unsafe impl<const N: usize> Sync for Allocator<N> {}
impl<const N: usize> Allocator<N> {
    /// Create a new [`Allocator`].
    ///
    /// This function is a `const fn`, therefore you can call it directly when
    /// creating the allocator. The heap itself is set up on the first
    /// allocation.
    ///
    /// # Panics
    /// This function will panic, if the supplied buffer size, i.e. `N` is less
    /// than `32` or not divisible by `8`.
    #[must_use = "assign the allocator to a static variable and apply the `#[global_allocator]`-attribute to make it the global allocator"]
    pub const fn new() -> Self {
        assert!(N >= 32, "too small heap memory: minimum size is 32");
        assert!(N % 8 == 0, "memory size has to be divisible by 8");

        // the sentinels occupy 16 bytes, the initial chunk has to fit as well
        let chunk_size = if N - 16 < CHUNK_SIZE {
            N - 16
        } else {
            CHUNK_SIZE
        };
        let config = Config::new()
            .with_chunk_size(chunk_size)
            .with_logging(false);
        Self {
            arena: Arena(UnsafeCell::new([0; N])),
            raw: spin::Mutex::new(RawAllocator::new(ArenaRegion::new(N), config)),
        }
    }

    /// Lock the allocator state and point it at the arena.
    fn lock(&self) -> spin::MutexGuard<'_, RawAllocator<ArenaRegion>> {
        let mut raw = self.raw.lock();
        // SAFETY: the arena has `N` bytes, is aligned to 8 and is always the
        // same memory for this allocator
        unsafe { raw.region_mut().bind(self.arena.0.get().cast()) };
        raw
    }
}
impl<const N: usize> Default for Allocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate a block for `layout` and return the address handed out.
///
/// # Safety
/// The region of `raw` has to be bound to its arena.
unsafe fn allocate(raw: &mut RawAllocator<ArenaRegion>, layout: Layout) -> *mut u8 {
    let align = layout.align();
    if align <= DSIZE {
        return match raw.alloc(layout.size()) {
            Ok(Some(bp)) => address_of(raw, bp),
            Ok(None) | Err(_) => ptr::null_mut(),
        };
    }

    let Some(n) = layout.size().checked_add(align) else {
        return ptr::null_mut();
    };
    let Ok(Some(bp)) = raw.alloc(n) else {
        return ptr::null_mut();
    };
    let block = address_of(raw, bp);
    // the shift is a multiple of 8 in `8..=align`, so there is always room
    // for the shift word in front of the aligned address
    let shift = align - block as usize % align;
    let aligned = block.add(shift);
    aligned.cast::<usize>().sub(1).write(shift);
    aligned
}

/// Recover the payload of an address handed out for `layout`.
///
/// # Safety
/// `ptr` has to be returned by [`allocate()`] for a layout with the same
/// alignment and must not be freed yet.
unsafe fn payload_of(raw: &RawAllocator<ArenaRegion>, ptr: *mut u8, layout: Layout) -> Payload {
    let block = if layout.align() <= DSIZE {
        ptr
    } else {
        ptr.sub(ptr.cast::<usize>().sub(1).read())
    };
    Payload::new(block as usize - raw.region().as_ptr() as usize)
}

/// Translate a payload into an address inside the arena.
fn address_of(raw: &RawAllocator<ArenaRegion>, bp: Payload) -> *mut u8 {
    // SAFETY: a payload is always inside of the granted part of the region
    unsafe { raw.region().as_ptr().add(bp.offset()) }
}

const _: () = assert!(mem::size_of::<usize>() <= DSIZE);

unsafe impl<const N: usize> GlobalAlloc for Allocator<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        allocate(&mut self.lock(), layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let mut raw = self.lock();
        let bp = payload_of(&raw, ptr, layout);
        raw.free(Some(bp));
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let mut raw = self.lock();
        if layout.align() <= DSIZE {
            let bp = payload_of(&raw, ptr, layout);
            return match raw.realloc(Some(bp), new_size) {
                Ok(Some(bp)) => address_of(&raw, bp),
                Ok(None) | Err(_) => ptr::null_mut(),
            };
        }

        // the shift depends on the address, so the data is moved by hand
        let new_layout = Layout::from_size_align_unchecked(new_size, layout.align());
        let new = allocate(&mut raw, new_layout);
        if !new.is_null() {
            ptr::copy_nonoverlapping(ptr, new, layout.size().min(new_size));
            let bp = payload_of(&raw, ptr, layout);
            raw.free(Some(bp));
        }
        new
    }
}
