//! Call accounting around any allocator.

use crate::allocator::{AllocError, ReplayAllocator};
use heapreplay_core::LiveAddress;
use serde::{Deserialize, Serialize};

/// One call made into the wrapped allocator, by requested size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocCall {
    /// `allocate(size)`
    Allocate(u64),
    /// `deallocate` of an allocation of this size
    Deallocate(u64),
}

/// Counters kept by [`CountingAllocator`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocStats {
    /// Successful allocate calls
    pub allocate_calls: u64,
    /// Allocate calls the inner allocator refused
    pub failed_allocate_calls: u64,
    /// Successful deallocate calls
    pub deallocate_calls: u64,
    /// Requested bytes currently live
    pub bytes_in_use: u64,
    /// Highest value `bytes_in_use` reached
    pub peak_bytes_in_use: u64,
}

/// Wraps an allocator and counts what passes through it
#[derive(Debug)]
pub struct CountingAllocator<A> {
    inner: A,
    stats: AllocStats,
    calls: Option<Vec<AllocCall>>,
}

impl<A: ReplayAllocator> CountingAllocator<A> {
    /// Count calls without remembering them
    #[must_use]
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            stats: AllocStats::default(),
            calls: None,
        }
    }

    /// Also remember every successful call in order
    #[must_use]
    pub fn recording(inner: A) -> Self {
        Self {
            inner,
            stats: AllocStats::default(),
            calls: Some(Vec::new()),
        }
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> &AllocStats {
        &self.stats
    }

    /// Recorded calls, empty unless built with [`recording`](Self::recording)
    #[must_use]
    pub fn calls(&self) -> &[AllocCall] {
        self.calls.as_deref().unwrap_or(&[])
    }

    /// Wrapped allocator
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Unwrap
    #[must_use]
    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: ReplayAllocator> ReplayAllocator for CountingAllocator<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn allocate(&mut self, size: u64) -> Result<LiveAddress, AllocError> {
        match self.inner.allocate(size) {
            Ok(live) => {
                self.stats.allocate_calls += 1;
                self.stats.bytes_in_use += size;
                self.stats.peak_bytes_in_use =
                    self.stats.peak_bytes_in_use.max(self.stats.bytes_in_use);
                if let Some(calls) = &mut self.calls {
                    calls.push(AllocCall::Allocate(size));
                }
                Ok(live)
            }
            Err(err) => {
                self.stats.failed_allocate_calls += 1;
                Err(err)
            }
        }
    }

    unsafe fn deallocate(&mut self, address: LiveAddress) -> Result<(), AllocError> {
        // SAFETY: forwarded contract
        unsafe { self.inner.deallocate(address)? };
        self.stats.deallocate_calls += 1;
        self.stats.bytes_in_use = self.stats.bytes_in_use.saturating_sub(address.size());
        if let Some(calls) = &mut self.calls {
            calls.push(AllocCall::Deallocate(address.size()));
        }
        Ok(())
    }
}
