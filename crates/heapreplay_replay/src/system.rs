//! Allocator backed by the process's global allocator.

use crate::allocator::{AllocError, ReplayAllocator};
use heapreplay_core::LiveAddress;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment RMM gives every allocation
pub const DEFAULT_ALIGNMENT: usize = 256;

/// Forwards every request to `std::alloc` with a fixed alignment
#[derive(Debug)]
pub struct SystemAllocator {
    alignment: usize,
}

impl SystemAllocator {
    /// Create with [`DEFAULT_ALIGNMENT`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    /// Create with a custom alignment
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidAlignment`] unless `alignment` is a
    /// non-zero power of two.
    pub fn with_alignment(alignment: usize) -> Result<Self, AllocError> {
        if !alignment.is_power_of_two() {
            return Err(AllocError::InvalidAlignment { alignment });
        }
        Ok(Self { alignment })
    }

    /// Alignment of every allocation
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Zero-byte requests take one alignment unit so every live address is
    /// distinct and non-null.
    fn layout_for(&self, size: u64) -> Result<Layout, AllocError> {
        let bytes = usize::try_from(size).map_err(|_| AllocError::InvalidSize { size })?;
        let bytes = if bytes == 0 { self.alignment } else { bytes };
        Layout::from_size_align(bytes, self.alignment).map_err(|_| AllocError::InvalidSize { size })
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayAllocator for SystemAllocator {
    fn name(&self) -> &str {
        "system"
    }

    fn allocate(&mut self, size: u64) -> Result<LiveAddress, AllocError> {
        let layout = self.layout_for(size)?;
        // SAFETY: `layout_for` never produces a zero-sized layout
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr)
            .map(|ptr| LiveAddress::new(ptr, size))
            .ok_or(AllocError::OutOfMemory { requested: size })
    }

    unsafe fn deallocate(&mut self, address: LiveAddress) -> Result<(), AllocError> {
        let layout = self.layout_for(address.size())?;
        // SAFETY: the caller guarantees `address` came from `allocate` above,
        // which used the same alignment and size-to-layout mapping
        unsafe { alloc::dealloc(address.as_ptr(), layout) };
        Ok(())
    }
}
