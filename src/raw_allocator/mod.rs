//! This module provides the raw allocator and its support types.
//!
//! A "raw allocator" hands out payload offsets inside its [`Region`] and knows
//! nothing about handles or the global allocator interface: it is the
//! boundary-tag engine consisting of the block layout, the free-space search,
//! the placement and the coalescing of free blocks.
mod buffer;
mod check;
mod entry;
mod fit;

pub use buffer::Payload;
pub use check::Inconsistency;
pub use entry::Entry;
pub use fit::FitPolicy;

use crate::config::Config;
use crate::error::Error;
use crate::region::Region;
use buffer::Buffer;
use core::cmp;

/// The word size: the size of a single header or footer.
pub const WSIZE: usize = 4;
/// The doubleword size: block sizes and payload offsets are multiples of it.
pub const DSIZE: usize = 8;
/// The smallest possible block: header, footer and one doubleword of payload.
pub const MIN_BLOCK: usize = 2 * DSIZE;
/// The largest block size representable in a tag.
const MAX_BLOCK: usize = u32::MAX as usize & !(DSIZE - 1);

/// Log through the `log`-facade, unless logging is disabled in the
/// configuration of the allocator.
macro_rules! heap_log {
    ($allocator:expr, $level:ident, $($arg:tt)+) => {
        if $allocator.config.logging() {
            log::$level!($($arg)+);
        }
    };
}

/// A single block as seen by an observer of the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// The total size of the block including header and footer.
    pub size: usize,
    /// Whether the block is currently allocated.
    pub allocated: bool,
    /// The offset of the header, i.e. the first byte of the block.
    pub start: usize,
    /// One past the last byte of the footer.
    pub end: usize,
}

/// Counters describing the work done by an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Number of successful heap extensions (including the initial one).
    pub extensions: usize,
    /// Number of successful allocations.
    pub allocations: usize,
    /// Number of freed blocks.
    pub frees: usize,
    /// Number of coalescing operations, that actually merged blocks.
    pub merges: usize,
}
impl Stats {
    const fn new() -> Self {
        Self {
            extensions: 0,
            allocations: 0,
            frees: 0,
            merges: 0,
        }
    }
}

/// A boundary-tag allocator working on payload offsets.
///
/// The allocator is created uninitialized (so that it can be constructed in a
/// `const`-context) and sets up its heap on the first call to
/// [`init()`](Self::init) or [`alloc()`](Self::alloc). A
/// [`teardown()`](Self::teardown) releases the whole region and returns the
/// allocator into the uninitialized state.
///
/// The heap layout inside the region is:
/// ```text
/// +-----+----------+----------+-------+-- ... --+-------+----------+
/// | pad | prologue | prologue | block |         | block | epilogue |
/// |     |  header  |  footer  |       |         |       |  header  |
/// +-----+----------+----------+-------+-- ... --+-------+----------+
///  4 B       4 B        4 B                                  4 B
/// ```
/// The alignment padding in front of the prologue puts every payload on a
/// doubleword boundary.
pub struct RawAllocator<R> {
    buffer: Buffer<R>,
    config: Config,
    /// The prologue block, `None` while uninitialized.
    first: Option<Payload>,
    /// The resume position of the next-fit search.
    rover: Payload,
    stats: Stats,
}
impl<R: Region> RawAllocator<R> {
    /// Create a new, uninitialized [`RawAllocator`] on top of a region.
    ///
    /// The allocator takes over the region: it assumes to be the only one
    /// growing it and that the current break is a multiple of `8`.
    pub const fn new(region: R, config: Config) -> Self {
        Self {
            buffer: Buffer::new(region),
            config,
            first: None,
            rover: Payload::new(0),
            stats: Stats::new(),
        }
    }

    /// Query, whether the heap was already set up.
    pub fn is_initialized(&self) -> bool {
        self.first.is_some()
    }

    /// Set up the heap: the sentinel blocks and an initial free block of the
    /// configured chunk size.
    ///
    /// This is a no-op on an already initialized allocator. If the region can
    /// not provide the initial memory, the region is reset, the allocator
    /// stays uninitialized and [`Error::OutOfMemory`] is returned.
    pub fn init(&mut self) -> Result<(), Error> {
        match self.first {
            Some(_) => Ok(()),
            None => self.setup().map(drop),
        }
    }

    fn setup(&mut self) -> Result<Payload, Error> {
        let start = self
            .buffer
            .region_mut()
            .grow(4 * WSIZE)
            .ok_or(Error::OutOfMemory {
                requested: 4 * WSIZE,
            })?;
        assert!(start % DSIZE == 0, "region break is not doubleword aligned");

        self.buffer.set(start, Entry::free(0)); // alignment padding
        self.buffer.set(start + WSIZE, Entry::used(DSIZE)); // prologue header
        self.buffer.set(start + 2 * WSIZE, Entry::used(DSIZE)); // prologue footer
        self.buffer.set(start + 3 * WSIZE, Entry::used(0)); // epilogue header

        let first = Payload::new(start + 2 * WSIZE);
        self.first = Some(first);
        self.rover = first;

        if let Err(error) = self.extend_heap(self.config.chunk_size() / WSIZE) {
            self.teardown();
            return Err(error);
        }
        heap_log!(
            self,
            debug,
            "[tagalloc] heap initialized with {} bytes",
            self.buffer.region().size()
        );
        Ok(first)
    }

    /// Release the whole heap.
    ///
    /// Every payload handed out before is invalid afterwards. The allocator is
    /// uninitialized again and may be re-initialized.
    pub fn teardown(&mut self) {
        self.buffer.region_mut().reset();
        self.first = None;
        self.rover = Payload::new(0);
        self.stats = Stats::new();
    }

    /// Tear the heap down and hand back the region.
    pub fn into_region(mut self) -> R {
        self.teardown();
        self.buffer.into_region()
    }

    /// Allocate a block with at least `n` bytes of payload.
    ///
    /// The heap is initialized on demand. A request for zero bytes yields
    /// `Ok(None)` without touching the heap. If no free block is large enough,
    /// the heap is extended by at least the configured chunk size and the
    /// request is placed into the new space. If the region cannot grow,
    /// [`Error::OutOfMemory`] is returned.
    pub fn alloc(&mut self, n: usize) -> Result<Option<Payload>, Error> {
        if n == 0 {
            return Ok(None);
        }
        self.alloc_block(n).map(Some)
    }

    fn alloc_block(&mut self, n: usize) -> Result<Payload, Error> {
        let first = match self.first {
            Some(first) => first,
            None => self.setup()?,
        };
        let asize = adjusted_size(n).ok_or(Error::OutOfMemory { requested: n })?;

        let bp = match self.find_fit(first, asize) {
            Some(bp) => bp,
            None => {
                let extend = cmp::max(asize, self.config.chunk_size());
                self.extend_heap(extend / WSIZE)?
            }
        };
        self.place(bp, asize);
        self.stats.allocations += 1;
        heap_log!(
            self,
            trace,
            "[tagalloc] alloc({}) -> {:#x} (block of {} bytes)",
            n,
            bp.offset(),
            self.buffer.entry(bp).size()
        );
        Ok(bp)
    }

    /// Free a block.
    ///
    /// `None` is ignored. The block is marked free and immediately merged with
    /// free neighbours. The payload is not validated: freeing anything that
    /// is not a currently allocated block corrupts the heap.
    pub fn free(&mut self, ptr: Option<Payload>) {
        let Some(bp) = ptr else {
            return;
        };
        let size = self.buffer.entry(bp).size();
        self.buffer.mark(bp, Entry::free(size));
        self.stats.frees += 1;
        heap_log!(self, trace, "[tagalloc] free({:#x}) of {} bytes", bp.offset(), size);
        self.coalesce(bp);
    }

    /// Resize an allocation by moving it into a fresh block.
    ///
    /// A size of zero frees the block and yields `Ok(None)`, a `None` pointer
    /// makes this a plain [`alloc()`](Self::alloc). Otherwise a new block is
    /// allocated, the first `min(n, old payload size)` bytes are copied and the
    /// old block is freed. The block is never resized in place. If the new
    /// allocation fails, the old block is left untouched.
    pub fn realloc(&mut self, ptr: Option<Payload>, n: usize) -> Result<Option<Payload>, Error> {
        if n == 0 {
            self.free(ptr);
            return Ok(None);
        }
        let Some(old) = ptr else {
            return self.alloc(n);
        };

        let new = self.alloc_block(n)?;
        let len = cmp::min(n, self.payload_size(old));
        self.buffer.copy(old, new, len);
        self.free(Some(old));
        Ok(Some(new))
    }

    /// Extend the heap by `words` words (rounded up to an even count) and
    /// return the resulting free block.
    ///
    /// The new free block starts where the epilogue used to be. It is merged
    /// with a free block in front of it.
    fn extend_heap(&mut self, words: usize) -> Result<Payload, Error> {
        let words = words + words % 2;
        let size = words * WSIZE;
        if size > MAX_BLOCK {
            return Err(Error::OutOfMemory { requested: size });
        }

        let Some(brk) = self.buffer.region_mut().grow(size) else {
            heap_log!(
                self,
                warn,
                "[tagalloc] cannot extend heap of {} bytes by {} bytes",
                self.buffer.region().size(),
                size
            );
            return Err(Error::OutOfMemory { requested: size });
        };

        let bp = Payload::new(brk);
        self.buffer.mark(bp, Entry::free(size)); // replaces the old epilogue
        let epilogue = self.buffer.header(self.buffer.next(bp));
        self.buffer.set(epilogue, Entry::used(0));
        self.stats.extensions += 1;
        heap_log!(
            self,
            debug,
            "[tagalloc] heap extended by {} bytes to {} bytes",
            size,
            self.buffer.region().size()
        );

        Ok(self.coalesce(bp))
    }

    /// Allocate `asize` bytes at the start of the free block `bp`, splitting
    /// off the remainder if it can form a block on its own.
    fn place(&mut self, bp: Payload, asize: usize) {
        let csize = self.buffer.entry(bp).size();

        if csize - asize >= MIN_BLOCK {
            self.buffer.mark(bp, Entry::used(asize));
            let rest = self.buffer.next(bp);
            self.buffer.mark(rest, Entry::free(csize - asize));
        } else {
            self.buffer.mark(bp, Entry::used(csize));
        }
        self.rover = self.buffer.next(bp);
    }

    /// Merge the free block `bp` with its free neighbours and return the
    /// resulting block.
    fn coalesce(&mut self, bp: Payload) -> Payload {
        let prev_free = self.buffer.at(bp.offset() - DSIZE).is_free();
        let next = self.buffer.next(bp);
        let next_free = self.buffer.entry(next).is_free();
        let size = self.buffer.entry(bp).size();

        let bp = match (prev_free, next_free) {
            (false, false) => return bp,
            (false, true) => {
                let size = size + self.buffer.entry(next).size();
                self.buffer.mark(bp, Entry::free(size));
                bp
            }
            (true, false) => {
                let prev = self.buffer.prev(bp);
                let size = size + self.buffer.entry(prev).size();
                self.buffer.mark(prev, Entry::free(size));
                prev
            }
            (true, true) => {
                let prev = self.buffer.prev(bp);
                let size = size + self.buffer.entry(prev).size() + self.buffer.entry(next).size();
                self.buffer.mark(prev, Entry::free(size));
                prev
            }
        };
        self.stats.merges += 1;

        // the rover must not point into the middle of the merged block
        if self.rover > bp && self.rover < self.buffer.next(bp) {
            self.rover = bp;
        }
        bp
    }

    /// The usable payload size of an allocated block.
    pub fn payload_size(&self, bp: Payload) -> usize {
        self.buffer.entry(bp).size() - DSIZE
    }

    /// The payload bytes of an allocated block.
    pub fn memory_of(&self, bp: Payload) -> &[u8] {
        self.buffer.memory_of(bp)
    }

    /// The payload bytes of an allocated block, mutably.
    pub fn memory_of_mut(&mut self, bp: Payload) -> &mut [u8] {
        self.buffer.memory_of_mut(bp)
    }

    /// Iterate over all blocks between the prologue and the epilogue.
    ///
    /// An uninitialized heap has no blocks.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.first
            .into_iter()
            .flat_map(move |first| self.buffer.blocks(first).skip(1))
            .map(move |bp| {
                let entry = self.buffer.entry(bp);
                let start = self.buffer.header(bp);
                BlockInfo {
                    size: entry.size(),
                    allocated: entry.is_used(),
                    start,
                    end: start + entry.size(),
                }
            })
    }

    /// The current free-space search policy.
    pub fn policy(&self) -> FitPolicy {
        self.config.policy()
    }

    /// Switch the search policy. This takes effect on the next allocation.
    pub fn set_policy(&mut self, policy: FitPolicy) {
        self.config.set_policy(policy);
    }

    /// The configuration of this allocator.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The counters since initialization.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// The backing region.
    pub fn region(&self) -> &R {
        self.buffer.region()
    }

    pub(crate) fn region_mut(&mut self) -> &mut R {
        self.buffer.region_mut()
    }
}

/// Round a payload request up to a block size: add room for header and footer
/// and round up to the doubleword size. `None` on overflow.
fn adjusted_size(n: usize) -> Option<usize> {
    if n <= DSIZE {
        return Some(MIN_BLOCK);
    }
    let size = n.checked_add(DSIZE + (DSIZE - 1))? / DSIZE * DSIZE;
    (size <= MAX_BLOCK).then(|| size)
}
