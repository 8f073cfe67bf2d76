//! The seam between the replay engine and the allocator under test.

use heapreplay_core::LiveAddress;

/// Allocator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The system could not satisfy the request
    #[error("Out of memory: requested {requested} bytes")]
    OutOfMemory {
        /// Requested size
        requested: u64,
    },

    /// A bounded allocator ran out of room
    #[error("Capacity exceeded: requested {requested} bytes, {available} bytes available")]
    CapacityExceeded {
        /// Requested size
        requested: u64,
        /// Bytes left in the allocator
        available: u64,
    },

    /// Size cannot be represented on this platform
    #[error("Invalid allocation size: {size}")]
    InvalidSize {
        /// Requested size
        size: u64,
    },

    /// Alignment is zero or not a power of two
    #[error("Invalid alignment: {alignment}")]
    InvalidAlignment {
        /// Rejected alignment
        alignment: usize,
    },

    /// Address was not handed out by this allocator
    #[error("Unknown address: {address:#x}")]
    UnknownAddress {
        /// Numeric address passed in
        address: usize,
    },

    /// Allocator configuration is unusable
    #[error("Invalid allocator configuration: {reason}")]
    InvalidConfig {
        /// Why it was rejected
        reason: String,
    },
}

/// An allocator that can be driven by a replay.
///
/// Calls are synchronous and made from a single thread, in log order.
/// Releasing is `unsafe`: a [`LiveAddress`] can be built from any pointer,
/// so only the caller can vouch for where it came from.
///
/// ```compile_fail
/// use heapreplay_core::LiveAddress;
/// use heapreplay_replay::{ReplayAllocator, SystemAllocator};
/// use std::ptr::NonNull;
///
/// let mut buf = [0u8; 64];
/// let foreign = LiveAddress::new(NonNull::from(&mut buf[0]), 64);
/// SystemAllocator::new().deallocate(foreign).unwrap();
/// ```
pub trait ReplayAllocator {
    /// Short name used in benchmark ids and reports
    fn name(&self) -> &str;

    /// Allocate `size` bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be satisfied.
    fn allocate(&mut self, size: u64) -> Result<LiveAddress, AllocError>;

    /// Release an allocation previously returned by [`allocate`](Self::allocate)
    ///
    /// # Safety
    ///
    /// `address` must have been returned by `allocate` on this same
    /// allocator and not released since. Allocators that validate addresses
    /// may document a weaker contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocator does not recognise `address`.
    unsafe fn deallocate(&mut self, address: LiveAddress) -> Result<(), AllocError>;
}

impl<A: ReplayAllocator + ?Sized> ReplayAllocator for &mut A {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn allocate(&mut self, size: u64) -> Result<LiveAddress, AllocError> {
        (**self).allocate(size)
    }

    unsafe fn deallocate(&mut self, address: LiveAddress) -> Result<(), AllocError> {
        // SAFETY: forwarded contract
        unsafe { (**self).deallocate(address) }
    }
}

impl<A: ReplayAllocator + ?Sized> ReplayAllocator for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn allocate(&mut self, size: u64) -> Result<LiveAddress, AllocError> {
        (**self).allocate(size)
    }

    unsafe fn deallocate(&mut self, address: LiveAddress) -> Result<(), AllocError> {
        // SAFETY: forwarded contract
        unsafe { (**self).deallocate(address) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_error_display() {
        let err = AllocError::CapacityExceeded {
            requested: 64,
            available: 32,
        };
        assert_eq!(
            err.to_string(),
            "Capacity exceeded: requested 64 bytes, 32 bytes available"
        );

        let err = AllocError::UnknownAddress { address: 0x1000 };
        assert_eq!(err.to_string(), "Unknown address: 0x1000");
    }
}
