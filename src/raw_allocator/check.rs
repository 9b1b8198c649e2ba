//! Heap consistency checking.
use super::entry::Entry;
use super::{RawAllocator, DSIZE, MIN_BLOCK, WSIZE};
use crate::region::Region;
use core::fmt;

/// A violated heap invariant found by [`RawAllocator::check()`].
///
/// All offsets are payload offsets of the offending block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    /// The prologue is not an allocated block of 8 bytes.
    BadPrologue,
    /// The heap does not end in an allocated, empty epilogue directly before
    /// the break of the region.
    BadEpilogue { offset: usize },
    /// A payload is not aligned to a doubleword.
    Misaligned { offset: usize },
    /// Header and footer of a block disagree.
    TagMismatch { offset: usize },
    /// A block is smaller than the minimum block size.
    Undersized { offset: usize, size: usize },
    /// A block extends past the end of the region.
    Overrun { offset: usize, size: usize },
    /// Two physically adjacent blocks are both free.
    AdjacentFree { offset: usize },
    /// The block sizes do not add up to the size of the region.
    SizeMismatch { blocks: usize, region: usize },
    /// The next-fit rover does not point to the start of a block.
    StrayRover { offset: usize },
}
impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Inconsistency::BadPrologue => write!(f, "bad prologue header"),
            Inconsistency::BadEpilogue { offset } => {
                write!(f, "bad epilogue header at {:#x}", offset)
            }
            Inconsistency::Misaligned { offset } => {
                write!(f, "{:#x} is not doubleword aligned", offset)
            }
            Inconsistency::TagMismatch { offset } => {
                write!(f, "header does not match footer at {:#x}", offset)
            }
            Inconsistency::Undersized { offset, size } => {
                write!(f, "block at {:#x} has only {} bytes", offset, size)
            }
            Inconsistency::Overrun { offset, size } => {
                write!(f, "block at {:#x} of {} bytes exceeds the heap", offset, size)
            }
            Inconsistency::AdjacentFree { offset } => {
                write!(f, "free block at {:#x} follows another free block", offset)
            }
            Inconsistency::SizeMismatch { blocks, region } => write!(
                f,
                "blocks account for {} bytes, but heap has {} bytes",
                blocks, region
            ),
            Inconsistency::StrayRover { offset } => {
                write!(f, "rover at {:#x} is not at a block boundary", offset)
            }
        }
    }
}

impl<R: Region> RawAllocator<R> {
    /// Walk the whole heap and verify its invariants.
    ///
    /// An uninitialized heap is trivially consistent. The walk stops at the
    /// first violation, so a corrupted size field cannot make it read outside
    /// of the region.
    pub fn check(&self) -> Result<(), Inconsistency> {
        let Some(first) = self.first else {
            return Ok(());
        };
        let hi = self.buffer.region().hi();

        if self.buffer.entry(first) != Entry::used(DSIZE)
            || self.buffer.at(self.buffer.footer(first)) != Entry::used(DSIZE)
        {
            return Err(Inconsistency::BadPrologue);
        }

        // the padding word in front of the prologue
        let mut total = WSIZE;
        let mut prev_free = false;
        let mut rover_seen = false;
        let mut bp = first;
        loop {
            let entry = self.buffer.entry(bp);
            let offset = bp.offset();
            rover_seen |= bp == self.rover;
            if entry.size() == 0 {
                break;
            }

            if offset % DSIZE != 0 {
                return Err(Inconsistency::Misaligned { offset });
            }
            if bp != first && entry.size() < MIN_BLOCK {
                return Err(Inconsistency::Undersized {
                    offset,
                    size: entry.size(),
                });
            }
            // room for the block itself plus the epilogue behind it
            if self.buffer.header(bp) + entry.size() + WSIZE > hi {
                return Err(Inconsistency::Overrun {
                    offset,
                    size: entry.size(),
                });
            }
            if self.buffer.at(self.buffer.footer(bp)) != entry {
                return Err(Inconsistency::TagMismatch { offset });
            }
            if prev_free && entry.is_free() {
                return Err(Inconsistency::AdjacentFree { offset });
            }

            prev_free = entry.is_free();
            total += entry.size();
            bp = self.buffer.next(bp);
        }

        let epilogue = self.buffer.entry(bp);
        if epilogue.is_free() || self.buffer.header(bp) + WSIZE != hi {
            return Err(Inconsistency::BadEpilogue {
                offset: bp.offset(),
            });
        }
        total += WSIZE;

        let region = self.buffer.region().size();
        if total != region {
            return Err(Inconsistency::SizeMismatch {
                blocks: total,
                region,
            });
        }
        if !rover_seen {
            return Err(Inconsistency::StrayRover {
                offset: self.rover.offset(),
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub(super) fn corrupt(&mut self, offset: usize, entry: Entry) {
        self.buffer.set(offset, entry);
    }
}
