//! Fixed-capacity pool allocator.
//!
//! One arena is reserved up front. Requests up to `max_class_block` are
//! rounded to a power-of-two size class and served from that class's free
//! list, falling back to bumping the arena. Larger requests are rounded to
//! the alignment and reuse the first freed large block that fits.
//! Freed blocks go back on their list and are reused LIFO; nothing is ever
//! returned to the system before the pool is dropped.

use crate::allocator::{AllocError, ReplayAllocator};
use ahash::AHashMap;
use heapreplay_core::LiveAddress;
use serde::{Deserialize, Serialize};
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Pool sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Arena size in bytes
    pub capacity: u64,
    /// Alignment of every block
    pub alignment: usize,
    /// Smallest size class
    pub min_block: usize,
    /// Largest size class; bigger requests take the large path
    pub max_class_block: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 1 << 30,
            alignment: 256,
            min_block: 256,
            max_class_block: 1 << 20,
        }
    }
}

impl PoolConfig {
    /// Default sizing with a different capacity
    #[must_use]
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<usize, AllocError> {
        let invalid = |reason: &str| AllocError::InvalidConfig {
            reason: reason.to_string(),
        };

        if !self.alignment.is_power_of_two() {
            return Err(AllocError::InvalidAlignment {
                alignment: self.alignment,
            });
        }
        if !self.min_block.is_power_of_two() || self.min_block < self.alignment {
            return Err(invalid("min_block must be a power of two no smaller than alignment"));
        }
        if !self.max_class_block.is_power_of_two() || self.max_class_block < self.min_block {
            return Err(invalid("max_class_block must be a power of two no smaller than min_block"));
        }
        let capacity = usize::try_from(self.capacity).map_err(|_| invalid("capacity exceeds address space"))?;
        if capacity == 0 {
            return Err(invalid("capacity must be non-zero"));
        }
        Ok(capacity)
    }
}

/// Bookkeeping for a handed-out block
#[derive(Debug, Clone, Copy)]
struct Block {
    /// Size class index, `None` for the large path
    class: Option<usize>,
    /// Bytes reserved for the block
    len: usize,
}

/// Size-class pool over a single arena
#[derive(Debug)]
pub struct PoolAllocator {
    arena: NonNull<u8>,
    arena_layout: Layout,
    alignment: usize,
    min_block_shift: u32,
    max_class_block: usize,
    /// Next never-used offset
    next: usize,
    /// Per-class stacks of free offsets
    class_bins: Vec<Vec<usize>>,
    /// Freed large blocks as (offset, len), in release order
    large_free: Vec<(usize, usize)>,
    /// Active blocks by offset
    active: AHashMap<usize, Block>,
    in_use: usize,
}

impl PoolAllocator {
    /// Reserve the arena
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent or the arena
    /// cannot be reserved.
    pub fn new(config: &PoolConfig) -> Result<Self, AllocError> {
        let capacity = config.validate()?;
        let arena_layout = Layout::from_size_align(capacity, config.alignment).map_err(|_| {
            AllocError::InvalidConfig {
                reason: format!("capacity {capacity} cannot be laid out"),
            }
        })?;

        // SAFETY: `validate` rejects a zero capacity
        let arena = NonNull::new(unsafe { alloc::alloc(arena_layout) }).ok_or(
            AllocError::OutOfMemory {
                requested: config.capacity,
            },
        )?;

        let min_block_shift = config.min_block.trailing_zeros();
        let classes = (config.max_class_block.trailing_zeros() - min_block_shift + 1) as usize;

        Ok(Self {
            arena,
            arena_layout,
            alignment: config.alignment,
            min_block_shift,
            max_class_block: config.max_class_block,
            next: 0,
            class_bins: vec![Vec::new(); classes],
            large_free: Vec::new(),
            active: AHashMap::new(),
            in_use: 0,
        })
    }

    /// Arena size in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.arena_layout.size()
    }

    /// Bytes reserved by active blocks (rounded to block size)
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Bytes of the arena that have ever been handed out
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.next
    }

    /// Number of active blocks
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Return a block to its free list.
    ///
    /// Never touches memory: an address that is not an active block of this
    /// pool is rejected, which makes this the safe form of `deallocate`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::UnknownAddress`] for anything but an active block.
    pub fn release(&mut self, address: LiveAddress) -> Result<(), AllocError> {
        let addr = address.addr();
        let unknown = AllocError::UnknownAddress { address: addr };
        let offset = addr
            .checked_sub(self.arena.as_ptr() as usize)
            .filter(|offset| *offset < self.capacity())
            .ok_or(unknown.clone())?;
        let block = self.active.remove(&offset).ok_or(unknown)?;

        self.in_use -= block.len;
        match block.class {
            Some(class) => self.class_bins[class].push(offset),
            None => self.large_free.push((offset, block.len)),
        }
        Ok(())
    }

    fn bump(&mut self, len: usize, requested: u64) -> Result<usize, AllocError> {
        let available = self.capacity() - self.next;
        if len > available {
            return Err(AllocError::CapacityExceeded {
                requested,
                available: available as u64,
            });
        }
        let offset = self.next;
        self.next += len;
        Ok(offset)
    }

    fn take_class(&mut self, bytes: usize, requested: u64) -> Result<(usize, Block), AllocError> {
        let len = bytes.max(1 << self.min_block_shift).next_power_of_two();
        let class = (len.trailing_zeros() - self.min_block_shift) as usize;
        let offset = match self.class_bins[class].pop() {
            Some(offset) => offset,
            None => self.bump(len, requested)?,
        };
        Ok((
            offset,
            Block {
                class: Some(class),
                len,
            },
        ))
    }

    fn take_large(&mut self, bytes: usize, requested: u64) -> Result<(usize, Block), AllocError> {
        let mask = self.alignment - 1;
        let len = bytes
            .checked_add(mask)
            .map(|padded| padded & !mask)
            .ok_or(AllocError::InvalidSize { size: requested })?;

        if let Some(index) = self.large_free.iter().position(|&(_, free)| free >= len) {
            // reuse the whole block; splitting is not worth it for replay
            let (offset, free) = self.large_free.remove(index);
            return Ok((offset, Block { class: None, len: free }));
        }

        let offset = self.bump(len, requested)?;
        Ok((offset, Block { class: None, len }))
    }
}

impl ReplayAllocator for PoolAllocator {
    fn name(&self) -> &str {
        "pool"
    }

    fn allocate(&mut self, size: u64) -> Result<LiveAddress, AllocError> {
        let bytes = usize::try_from(size).map_err(|_| AllocError::InvalidSize { size })?;
        let (offset, block) = if bytes <= self.max_class_block {
            self.take_class(bytes, size)?
        } else {
            self.take_large(bytes, size)?
        };

        self.active.insert(offset, block);
        self.in_use += block.len;

        // SAFETY: every offset handed out lies below `next`, which never
        // exceeds the arena size
        let ptr = unsafe { self.arena.add(offset) };
        Ok(LiveAddress::new(ptr, size))
    }

    /// Checks `address` against the active blocks, so any value is sound
    /// to pass; see [`release`](PoolAllocator::release).
    unsafe fn deallocate(&mut self, address: LiveAddress) -> Result<(), AllocError> {
        self.release(address)
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        // SAFETY: the arena was allocated in `new` with this exact layout
        unsafe { alloc::dealloc(self.arena.as_ptr(), self.arena_layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> PoolAllocator {
        PoolAllocator::new(&PoolConfig {
            capacity: 64 * 1024,
            alignment: 256,
            min_block: 256,
            max_class_block: 4096,
        })
        .unwrap()
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.capacity, 1 << 30);
        assert_eq!(config.alignment, 256);
        assert_eq!(PoolConfig::with_capacity(4096).capacity, 4096);
    }

    #[test]
    fn test_pool_rejects_bad_config() {
        let config = PoolConfig {
            alignment: 24,
            ..PoolConfig::with_capacity(4096)
        };
        assert!(matches!(
            PoolAllocator::new(&config),
            Err(AllocError::InvalidAlignment { alignment: 24 })
        ));

        let config = PoolConfig {
            min_block: 128,
            ..PoolConfig::with_capacity(4096)
        };
        assert!(matches!(
            PoolAllocator::new(&config),
            Err(AllocError::InvalidConfig { .. })
        ));

        assert!(PoolAllocator::new(&PoolConfig::with_capacity(0)).is_err());
    }

    #[test]
    fn test_pool_allocations_are_aligned_and_distinct() {
        let mut pool = small_pool();
        let a = pool.allocate(10).unwrap();
        let b = pool.allocate(300).unwrap();
        assert_ne!(a.addr(), b.addr());
        assert_eq!(a.addr() % 256, 0);
        assert_eq!(b.addr() % 256, 0);
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.in_use(), 256 + 512);
    }

    #[test]
    fn test_pool_reuses_freed_block() {
        let mut pool = small_pool();
        let a = pool.allocate(100).unwrap();
        pool.release(a).unwrap();
        let b = pool.allocate(200).unwrap();
        assert_eq!(a.addr(), b.addr());
        assert_eq!(pool.high_water(), 256);
    }

    #[test]
    fn test_pool_large_path_first_fit() {
        let mut pool = small_pool();
        let big = pool.allocate(10_000).unwrap();
        assert_eq!(pool.in_use(), 10_240);
        pool.release(big).unwrap();

        let smaller_big = pool.allocate(5_000).unwrap();
        assert_eq!(smaller_big.addr(), big.addr());
        assert_eq!(pool.in_use(), 10_240);
    }

    #[test]
    fn test_pool_capacity_exceeded() {
        let mut pool = small_pool();
        let err = pool.allocate(100_000).unwrap_err();
        assert_eq!(
            err,
            AllocError::CapacityExceeded {
                requested: 100_000,
                available: 64 * 1024,
            }
        );
    }

    #[test]
    fn test_pool_capacity_recovers_after_free() {
        let mut pool = small_pool();
        let blocks: Vec<_> = (0..16).map(|_| pool.allocate(4096).unwrap()).collect();
        assert!(pool.allocate(4096).is_err());

        pool.release(blocks[3]).unwrap();
        let again = pool.allocate(4000).unwrap();
        assert_eq!(again.addr(), blocks[3].addr());
    }

    #[test]
    fn test_pool_rejects_unknown_address() {
        let mut pool = small_pool();
        let a = pool.allocate(64).unwrap();
        pool.release(a).unwrap();
        assert!(matches!(
            pool.release(a),
            Err(AllocError::UnknownAddress { .. })
        ));

        let mut outside = 0u8;
        let foreign = LiveAddress::new(NonNull::from(&mut outside), 1);
        assert!(matches!(
            pool.release(foreign),
            Err(AllocError::UnknownAddress { .. })
        ));
    }

    #[test]
    fn test_pool_zero_sized_allocation() {
        let mut pool = small_pool();
        let a = pool.allocate(0).unwrap();
        let b = pool.allocate(0).unwrap();
        assert_ne!(a.addr(), b.addr());
        assert_eq!(a.size(), 0);
    }
}
