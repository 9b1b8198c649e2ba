//! The free-space search.
use super::buffer::Payload;
use super::RawAllocator;
use crate::region::Region;

/// The strategy used to find a free block for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitPolicy {
    /// Scan from the first block of the heap and take the first free block,
    /// that is large enough.
    #[default]
    FirstFit,
    /// Resume scanning at the block following the most recent placement up to
    /// the end of the heap, then wrap around and scan from the first block up
    /// to that position.
    ///
    /// This trades the strict first-fit order for shorter scans, as the front
    /// of the heap tends to fill up with small allocated blocks.
    NextFit,
}

impl<R: Region> RawAllocator<R> {
    /// Find a free block of at least `asize` bytes (header and footer
    /// included).
    ///
    /// This is a pure traversal: neither the heap nor the rover is modified.
    /// Must only be called on an initialized heap.
    pub(super) fn find_fit(&self, first: Payload, asize: usize) -> Option<Payload> {
        let fits = |bp: &Payload| {
            let entry = self.buffer.entry(*bp);
            entry.is_free() && asize <= entry.size()
        };

        match self.config.policy() {
            FitPolicy::FirstFit => self.buffer.blocks(first).find(fits),
            FitPolicy::NextFit => {
                let rover = self.rover;
                self.buffer.blocks(rover).find(fits).or_else(|| {
                    self.buffer
                        .blocks(first)
                        .take_while(|bp| *bp < rover)
                        .find(fits)
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FitPolicy;
    use crate::raw_allocator::{Payload, RawAllocator};
    use crate::region::VecRegion;
    use crate::Config;

    fn allocator(policy: FitPolicy, chunk_size: usize) -> RawAllocator<VecRegion> {
        let config = Config::new()
            .with_policy(policy)
            .with_chunk_size(chunk_size);
        let mut allocator = RawAllocator::new(VecRegion::new(), config);
        allocator.init().unwrap();
        allocator
    }

    fn alloc(allocator: &mut RawAllocator<VecRegion>, n: usize) -> Payload {
        allocator.alloc(n).unwrap().unwrap()
    }

    #[test]
    fn first_fit_reuses_front_block() {
        let mut allocator = allocator(FitPolicy::FirstFit, 4096);
        let a = alloc(&mut allocator, 16);
        let _b = alloc(&mut allocator, 16);
        allocator.free(Some(a));

        assert_eq!(alloc(&mut allocator, 16), a);
    }

    #[test]
    fn next_fit_resumes_after_last_placement() {
        let mut allocator = allocator(FitPolicy::NextFit, 4096);
        let a = alloc(&mut allocator, 16);
        let b = alloc(&mut allocator, 16);
        allocator.free(Some(a));

        let c = alloc(&mut allocator, 16);
        assert!(c > b, "next fit must not go back to the freed front block");
        assert_eq!(allocator.check(), Ok(()));
    }

    #[test]
    fn next_fit_wraps_around() {
        // 72 bytes of initial heap hold exactly three 24-byte blocks
        let mut allocator = allocator(FitPolicy::NextFit, 72);
        let a = alloc(&mut allocator, 16);
        let _b = alloc(&mut allocator, 16);
        let _c = alloc(&mut allocator, 16);
        allocator.free(Some(a));
        let extensions = allocator.stats().extensions;

        assert_eq!(alloc(&mut allocator, 16), a);
        assert_eq!(allocator.stats().extensions, extensions, "no growth needed");
    }

    #[test]
    fn skips_too_small_blocks() {
        let mut allocator = allocator(FitPolicy::FirstFit, 4096);
        let a = alloc(&mut allocator, 16);
        let _b = alloc(&mut allocator, 16);
        allocator.free(Some(a));

        let c = alloc(&mut allocator, 64);
        assert_ne!(c, a);
        assert_eq!(allocator.blocks().next().map(|block| block.allocated), Some(false));
    }

    #[test]
    fn no_fit() {
        let allocator = allocator(FitPolicy::FirstFit, 64);
        let first = allocator.first.unwrap();
        assert_eq!(allocator.find_fit(first, 72), None);
        assert!(allocator.find_fit(first, 64).is_some());
    }
}
