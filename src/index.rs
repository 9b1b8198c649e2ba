//! The table of all allocations ever made through a [`Heap`](crate::Heap).
use crate::error::Error;
use crate::raw_allocator::Payload;
use alloc::vec::Vec;
use core::fmt;

/// The sequence number of an allocation.
///
/// Block ids start at `1` and grow by one per successful allocation. An id is
/// never reused, not even after its block was freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(usize);
impl BlockId {
    /// Create a block id from its sequence number.
    pub const fn new(sequence: usize) -> Self {
        Self(sequence)
    }

    /// The sequence number of this id.
    pub const fn get(self) -> usize {
        self.0
    }
}
impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    payload: Payload,
    live: bool,
}

/// An append-only mapping from [`BlockId`]s to payloads.
///
/// Entries are never removed. Freeing a block only retires its entry, so that
/// later uses of the id are detected as [`Error::InvalidHandle`].
#[derive(Debug, Clone, Default)]
pub struct AllocationIndex {
    slots: Vec<Slot>,
    capacity: Option<usize>,
}
impl AllocationIndex {
    /// Create an empty index, optionally limited to `capacity` entries.
    pub const fn new(capacity: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    /// The number of ids handed out so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Query, whether no id was handed out yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Make sure there is room for one more entry.
    pub fn ensure_capacity(&self) -> Result<(), Error> {
        match self.capacity {
            Some(capacity) if self.slots.len() >= capacity => {
                Err(Error::CapacityExceeded { capacity })
            }
            _ => Ok(()),
        }
    }

    /// Record a new allocation and return its id.
    ///
    /// Callers have to check [`ensure_capacity()`](Self::ensure_capacity)
    /// first; this never fails on its own.
    pub fn record(&mut self, payload: Payload) -> BlockId {
        self.slots.push(Slot {
            payload,
            live: true,
        });
        BlockId(self.slots.len())
    }

    /// Look up the payload of a live allocation.
    pub fn lookup(&self, id: BlockId) -> Result<Payload, Error> {
        match self.slot(id) {
            Some(slot) if slot.live => Ok(slot.payload),
            _ => Err(Error::InvalidHandle(id)),
        }
    }

    /// Mark an allocation as freed and return its payload.
    pub fn retire(&mut self, id: BlockId) -> Result<Payload, Error> {
        let payload = self.lookup(id)?;
        if let Some(slot) = id.0.checked_sub(1).and_then(|i| self.slots.get_mut(i)) {
            slot.live = false;
        }
        Ok(payload)
    }

    /// Iterate over all live allocations in order of their ids.
    pub fn live(&self) -> impl Iterator<Item = (BlockId, Payload)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.live)
            .map(|(i, slot)| (BlockId(i + 1), slot.payload))
    }

    fn slot(&self, id: BlockId) -> Option<&Slot> {
        self.slots.get(id.0.checked_sub(1)?)
    }
}
