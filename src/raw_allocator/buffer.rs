use super::entry::Entry;
use super::{DSIZE, WSIZE};
use crate::region::Region;
use core::{ptr, slice};

/// The offset of a block's payload inside the heap region.
///
/// This is the "block pointer" of the allocator: the header of the block lives
/// directly in front of it, the footer at the end of the payload. All payload
/// offsets handed out by the allocator are multiples of the doubleword size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(usize);
impl Payload {
    pub(crate) const fn new(offset: usize) -> Self {
        Self(offset)
    }

    /// The offset of the payload from the start of the region.
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// The heap memory viewed as a sequence of boundary-tagged blocks.
///
/// This type owns the [`Region`] and provides the block address arithmetic:
/// given a [`Payload`] it computes the header, footer, next and previous
/// block. Those computations rely on well-formed tags, which is an invariant
/// the allocator maintains.
pub struct Buffer<R>(R);
impl<R: Region> Buffer<R> {
    /// Wrap a region.
    pub const fn new(region: R) -> Self {
        Self(region)
    }

    pub fn region(&self) -> &R {
        &self.0
    }

    pub fn region_mut(&mut self) -> &mut R {
        &mut self.0
    }

    pub fn into_region(self) -> R {
        self.0
    }

    /// Read the tag at the given byte offset.
    ///
    /// # Panics
    /// This function panics if the offset is not a multiple of 4 or the offset
    /// plus the 4 bytes after it would read past the break.
    pub fn at(&self, offset: usize) -> Entry {
        assert!(offset % WSIZE == 0);
        assert!(offset + WSIZE <= self.0.size());

        // SAFETY: the tag lies below the break of the region
        let raw = unsafe { ptr::read(self.0.as_ptr().add(offset).cast::<[u8; WSIZE]>()) };
        Entry::from_raw(raw)
    }

    /// Write the tag at the given byte offset.
    ///
    /// # Panics
    /// This function panics if the offset is not a multiple of 4 or the offset
    /// plus the 4 bytes after it would write past the break.
    pub fn set(&mut self, offset: usize, entry: Entry) {
        assert!(offset % WSIZE == 0);
        assert!(offset + WSIZE <= self.0.size());

        // SAFETY: the tag lies below the break of the region
        unsafe { ptr::write(self.0.as_ptr().add(offset).cast::<[u8; WSIZE]>(), entry.as_raw()) };
    }

    /// The offset of the header of the given block.
    pub fn header(&self, bp: Payload) -> usize {
        bp.0 - WSIZE
    }

    /// The offset of the footer of the given block.
    pub fn footer(&self, bp: Payload) -> usize {
        bp.0 + self.entry(bp).size() - DSIZE
    }

    /// The header tag of the given block.
    pub fn entry(&self, bp: Payload) -> Entry {
        self.at(self.header(bp))
    }

    /// Write both header and footer of the given block.
    ///
    /// The header is written first, as the position of the footer is derived
    /// from the size stored in the header.
    pub fn mark(&mut self, bp: Payload, entry: Entry) {
        let header = self.header(bp);
        self.set(header, entry);
        let footer = self.footer(bp);
        self.set(footer, entry);
    }

    /// The block physically following the given one.
    ///
    /// For the last regular block this is the epilogue.
    pub fn next(&self, bp: Payload) -> Payload {
        Payload(bp.0 + self.entry(bp).size())
    }

    /// The block physically preceding the given one.
    ///
    /// This reads the footer of the previous block, which is the reason every
    /// block carries a footer.
    pub fn prev(&self, bp: Payload) -> Payload {
        Payload(bp.0 - self.at(bp.0 - DSIZE).size())
    }

    /// The usable payload bytes of the given block.
    ///
    /// Only this block's payload is borrowed, never the whole region.
    pub fn memory_of(&self, bp: Payload) -> &[u8] {
        let size = self.payload_size(bp);
        // SAFETY: the payload lies below the break, header and footer are
        // outside of it and the borrow of `self` keeps the tags unchanged
        unsafe { slice::from_raw_parts(self.0.as_ptr().add(bp.0), size) }
    }

    /// The usable payload bytes of the given block, mutably.
    pub fn memory_of_mut(&mut self, bp: Payload) -> &mut [u8] {
        let size = self.payload_size(bp);
        // SAFETY: as in `memory_of()`, exclusive through the borrow of `self`
        unsafe { slice::from_raw_parts_mut(self.0.as_ptr().add(bp.0), size) }
    }

    fn payload_size(&self, bp: Payload) -> usize {
        let size = self.entry(bp).size() - DSIZE;
        assert!(bp.0 + size + WSIZE <= self.0.size());
        size
    }

    /// Copy `len` payload bytes from block `from` into block `to`.
    ///
    /// # Panics
    /// This function panics if `len` exceeds the payload of either block.
    pub fn copy(&mut self, from: Payload, to: Payload, len: usize) {
        assert!(len <= self.payload_size(from) && len <= self.payload_size(to));
        let base = self.0.as_ptr();
        // SAFETY: both ranges are payloads below the break
        unsafe { ptr::copy(base.add(from.0), base.add(to.0), len) };
    }

    /// Iterate over all blocks starting at `first` up to (excluding) the
    /// epilogue.
    pub fn blocks(&self, first: Payload) -> BlockIter<'_, R> {
        BlockIter {
            buffer: self,
            current: first,
        }
    }
}

/// An iterator over consecutive blocks, stopping at the epilogue.
pub struct BlockIter<'buffer, R> {
    buffer: &'buffer Buffer<R>,
    current: Payload,
}
impl<'buffer, R: Region> Iterator for BlockIter<'buffer, R> {
    type Item = Payload;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.entry(self.current).size() == 0 {
            return None;
        }
        let bp = self.current;
        self.current = self.buffer.next(bp);
        Some(bp)
    }
}

#[cfg(test)]
mod tests {
    use super::{Buffer, Entry, Payload};
    use crate::region::{Region, StaticRegion};

    /// Lay out `pad | prologue | used(16) | free(24) | epilogue` by hand.
    fn buffer() -> Buffer<StaticRegion<64>> {
        let mut region = StaticRegion::<64>::new();
        region.grow(56).unwrap();
        let mut buffer = Buffer::new(region);
        buffer.set(0, Entry::free(0));
        buffer.mark(Payload(8), Entry::used(8));
        buffer.mark(Payload(16), Entry::used(16));
        buffer.mark(Payload(32), Entry::free(24));
        buffer.set(52, Entry::used(0));
        buffer
    }

    #[test]
    fn header_and_footer() {
        let buffer = buffer();
        assert_eq!(buffer.header(Payload(16)), 12);
        assert_eq!(buffer.footer(Payload(16)), 24);
        assert_eq!(buffer.at(24), Entry::used(16));
        assert_eq!(buffer.footer(Payload(32)), 48);
        assert_eq!(buffer.at(48), Entry::free(24));
    }

    #[test]
    fn neighbours() {
        let buffer = buffer();
        assert_eq!(buffer.next(Payload(16)), Payload(32));
        assert_eq!(buffer.prev(Payload(32)), Payload(16));
        assert_eq!(buffer.prev(Payload(16)), Payload(8));
        assert_eq!(buffer.entry(buffer.next(Payload(32))), Entry::used(0));
    }

    #[test]
    fn block_iter() {
        let buffer = buffer();
        let mut iter = buffer.blocks(Payload(8));
        assert_eq!(iter.next(), Some(Payload(8)));
        assert_eq!(iter.next(), Some(Payload(16)));
        assert_eq!(iter.next(), Some(Payload(32)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn memory_of() {
        let mut buffer = buffer();
        assert_eq!(buffer.memory_of(Payload(16)).len(), 8);
        buffer.memory_of_mut(Payload(16)).fill(0xaa);
        assert_eq!(buffer.at(12), Entry::used(16), "header untouched");
        assert_eq!(buffer.at(24), Entry::used(16), "footer untouched");
    }

    #[test]
    fn copy_between_payloads() {
        let mut buffer = buffer();
        buffer.memory_of_mut(Payload(16)).copy_from_slice(b"abcdefgh");
        buffer.copy(Payload(16), Payload(32), 8);
        assert_eq!(&buffer.memory_of(Payload(32))[..8], b"abcdefgh");
        assert_eq!(buffer.at(48), Entry::free(24), "footer untouched");
    }

    #[test]
    #[should_panic]
    fn read_past_break() {
        let buffer = buffer();
        let _ = buffer.at(56);
    }
}
