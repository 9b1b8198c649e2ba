//! The handle-based interface to the allocator.
//!
//! A [`Heap`] combines a [`RawAllocator`] with an [`AllocationIndex`]: every
//! allocation is identified by a [`BlockId`] instead of a payload offset. This
//! is the interface an interactive shell or a test driver talks to. Contrary
//! to the raw allocator, every id is validated, so freeing a block twice or
//! reading a freed block is reported as [`Error::InvalidHandle`] instead of
//! corrupting the heap.
use crate::config::Config;
use crate::error::Error;
use crate::index::{AllocationIndex, BlockId};
use crate::raw_allocator::{BlockInfo, FitPolicy, Inconsistency, Payload, RawAllocator, Stats};
use crate::region::Region;

/// An initialized heap with an allocation index.
///
/// ```
/// use tagalloc::{Config, Heap, VecRegion};
///
/// let mut heap = Heap::new(VecRegion::new(), Config::new()).unwrap();
/// let id = heap.allocate(16).unwrap().unwrap();
/// heap.write(id, b'a', 4).unwrap();
/// assert_eq!(heap.read(id, 4).unwrap(), b"aaaa");
/// heap.free(id).unwrap();
/// assert!(heap.free(id).is_err());
/// ```
pub struct Heap<R: Region> {
    raw: RawAllocator<R>,
    index: AllocationIndex,
}
impl<R: Region> Heap<R> {
    /// Set up a new heap inside `region`.
    ///
    /// This fails with [`Error::OutOfMemory`], if the region cannot provide
    /// the initial chunk.
    pub fn new(region: R, config: Config) -> Result<Self, Error> {
        let mut raw = RawAllocator::new(region, config);
        raw.init()?;
        Ok(Self {
            raw,
            index: AllocationIndex::new(config.index_capacity()),
        })
    }

    /// Release the whole heap and hand back the (reset) region.
    pub fn teardown(self) -> R {
        self.raw.into_region()
    }

    /// Allocate a block of at least `n` bytes.
    ///
    /// Returns the id of the new block, or `None` for a zero-sized request.
    pub fn allocate(&mut self, n: usize) -> Result<Option<BlockId>, Error> {
        if n == 0 {
            return Ok(None);
        }
        let logging = self.raw.config().logging();
        self.index.ensure_capacity().map_err(|error| {
            if logging {
                log::warn!("[tagalloc] allocate({}) rejected: {}", n, error);
            }
            error
        })?;

        let Some(payload) = self.raw.alloc(n)? else {
            return Ok(None);
        };
        let id = self.index.record(payload);
        if logging {
            log::trace!("[tagalloc] block {} at {:#x}", id, payload.offset());
        }
        Ok(Some(id))
    }

    /// Free the block with the given id.
    ///
    /// The payload is zeroed before the block is released, so stale contents
    /// never show up in a later allocation of the same memory.
    pub fn free(&mut self, id: BlockId) -> Result<(), Error> {
        let payload = self.index.retire(id)?;
        self.raw.memory_of_mut(payload).fill(0);
        self.raw.free(Some(payload));
        Ok(())
    }

    /// Move the block into a fresh block of at least `n` bytes.
    ///
    /// The first `min(n, payload size)` bytes are copied over, the old id is
    /// retired and a new id is returned. A size of zero frees the block and
    /// returns `None`. On failure the old block stays valid and untouched.
    pub fn resize(&mut self, id: BlockId, n: usize) -> Result<Option<BlockId>, Error> {
        let old = self.index.lookup(id)?;
        if n == 0 {
            self.free(id)?;
            return Ok(None);
        }
        self.index.ensure_capacity()?;

        let Some(new) = self.raw.realloc(Some(old), n)? else {
            return Ok(None);
        };
        self.index.retire(id)?;
        Ok(Some(self.index.record(new)))
    }

    /// The payload offset of a live block.
    pub fn payload(&self, id: BlockId) -> Result<Payload, Error> {
        self.index.lookup(id)
    }

    /// The usable payload size of a live block.
    pub fn payload_size(&self, id: BlockId) -> Result<usize, Error> {
        Ok(self.raw.payload_size(self.index.lookup(id)?))
    }

    /// Read the first `n` payload bytes of a live block.
    pub fn read(&self, id: BlockId, n: usize) -> Result<&[u8], Error> {
        let memory = self.raw.memory_of(self.index.lookup(id)?);
        memory.get(..n).ok_or(Error::PayloadTooSmall {
            requested: n,
            available: memory.len(),
        })
    }

    /// Fill the payload of a live block with `count` copies of `byte`.
    ///
    /// The write is rejected, if twice the count exceeds the payload size.
    /// Nothing is written in that case.
    pub fn write(&mut self, id: BlockId, byte: u8, count: usize) -> Result<(), Error> {
        let memory = self.raw.memory_of_mut(self.index.lookup(id)?);
        if count.saturating_mul(2) > memory.len() {
            return Err(Error::PayloadTooSmall {
                requested: count.saturating_mul(2),
                available: memory.len(),
            });
        }
        memory[..count].fill(byte);
        Ok(())
    }

    /// Iterate over all blocks of the heap (free and allocated) in address
    /// order, excluding the sentinels.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.raw.blocks()
    }

    /// Iterate over all live allocations in order of their ids.
    pub fn allocations(&self) -> impl Iterator<Item = (BlockId, Payload)> + '_ {
        self.index.live()
    }

    /// The current free-space search policy.
    pub fn policy(&self) -> FitPolicy {
        self.raw.policy()
    }

    /// Switch the search policy. This takes effect on the next allocation.
    pub fn set_policy(&mut self, policy: FitPolicy) {
        self.raw.set_policy(policy);
    }

    /// Verify the heap invariants.
    pub fn check(&self) -> Result<(), Inconsistency> {
        self.raw.check()
    }

    /// The counters of the underlying allocator.
    pub fn stats(&self) -> Stats {
        self.raw.stats()
    }

    /// The backing region.
    pub fn region(&self) -> &R {
        self.raw.region()
    }

    /// The underlying allocator.
    pub fn raw(&self) -> &RawAllocator<R> {
        &self.raw
    }
}
