//! The error type of the allocator.
use crate::index::BlockId;
use core::fmt;

/// An error reported by an allocator operation.
///
/// Requesting zero bytes is not an error: it is answered with "no allocation"
/// (`Ok(None)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The backing region could not supply the memory required to satisfy the
    /// request. Any extension performed before the failure stays valid and is
    /// available to later requests.
    OutOfMemory {
        /// The number of bytes that could not be obtained.
        requested: usize,
    },
    /// The allocation index is full, so the allocation was rejected before
    /// touching the heap.
    CapacityExceeded {
        /// The configured capacity of the index.
        capacity: usize,
    },
    /// The block id was never handed out or its block was already freed.
    InvalidHandle(BlockId),
    /// A read or write does not fit into the payload of the addressed block.
    PayloadTooSmall {
        /// The number of bytes required by the operation.
        requested: usize,
        /// The usable payload size of the block.
        available: usize,
    },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory { requested } => {
                write!(f, "out of memory: cannot extend heap by {} bytes", requested)
            }
            Error::CapacityExceeded { capacity } => {
                write!(f, "allocation index full ({} entries)", capacity)
            }
            Error::InvalidHandle(id) => write!(f, "\"{}\": invalid block number", id),
            Error::PayloadTooSmall {
                requested,
                available,
            } => write!(
                f,
                "payload of {} bytes is not big enough for {} bytes",
                available, requested
            ),
        }
    }
}
