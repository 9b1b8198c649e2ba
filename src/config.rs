//! Tunables of an allocator instance.
use crate::raw_allocator::{FitPolicy, DSIZE, MIN_BLOCK};

/// The default amount of bytes the heap is extended by, if no free block fits.
pub const CHUNK_SIZE: usize = 1 << 12;

/// The configuration of an allocator.
///
/// All setters are `const fn`s, so a configuration can be built in `const`- and
/// `static`-contexts:
/// ```
/// use tagalloc::{Config, FitPolicy};
///
/// const CONFIG: Config = Config::new()
///     .with_chunk_size(1024)
///     .with_policy(FitPolicy::NextFit)
///     .with_index_capacity(1000);
/// assert_eq!(CONFIG.chunk_size(), 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    chunk_size: usize,
    policy: FitPolicy,
    index_capacity: Option<usize>,
    logging: bool,
}
impl Config {
    /// The default configuration: extend by [`CHUNK_SIZE`], first-fit search,
    /// an unbounded allocation index and logging enabled.
    pub const fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            policy: FitPolicy::FirstFit,
            index_capacity: None,
            logging: true,
        }
    }

    /// Set the minimum number of bytes the heap grows by.
    ///
    /// This is also the size of the initial heap.
    ///
    /// # Panics
    /// This function panics if `chunk_size` is less than `16` (the minimum
    /// block size) or not divisible by `8`.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size >= MIN_BLOCK, "chunk size below minimum block size");
        assert!(chunk_size % DSIZE == 0, "chunk size has to be divisible by 8");
        self.chunk_size = chunk_size;
        self
    }

    /// Set the free-space search policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: FitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Limit the number of entries of the allocation index.
    ///
    /// Allocations beyond that limit are rejected with
    /// [`Error::CapacityExceeded`](crate::Error::CapacityExceeded).
    #[must_use]
    pub const fn with_index_capacity(mut self, capacity: usize) -> Self {
        self.index_capacity = Some(capacity);
        self
    }

    /// Enable or disable the messages emitted through the [`log`]-facade.
    ///
    /// The global allocator disables them: a logger, that allocates, would
    /// re-enter the allocator while it is locked.
    #[must_use]
    pub const fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// The minimum number of bytes the heap grows by.
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The free-space search policy.
    pub const fn policy(&self) -> FitPolicy {
        self.policy
    }

    /// The maximum number of entries of the allocation index, if limited.
    pub const fn index_capacity(&self) -> Option<usize> {
        self.index_capacity
    }

    /// Whether the allocator logs.
    pub const fn logging(&self) -> bool {
        self.logging
    }

    pub(crate) fn set_policy(&mut self, policy: FitPolicy) {
        self.policy = policy;
    }
}
impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
