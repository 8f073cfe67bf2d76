//! Addresses seen during a replay.
//!
//! A log records the pointers the *historical* allocator returned. Those are
//! only ever used as keys: they are wrapped in [`OriginalAddress`], which has
//! no way to turn back into a pointer. The allocator under test hands out
//! [`LiveAddress`] values, which are real pointers owned by that allocator.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ptr::NonNull;
use std::str::FromStr;

/// Address recorded in an allocation log.
///
/// Unique only within one allocate/free pair: the historical allocator
/// recycles addresses once they are freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OriginalAddress(u64);

impl OriginalAddress {
    /// Create from a raw integer
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw integer
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Parse a hexadecimal address such as `0x7fb3c446f000`.
    ///
    /// Surrounding whitespace is ignored and the `0x`/`0X` radix marker is
    /// optional.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAddress`] if the text is empty, contains
    /// non-hex digits, or does not fit in 64 bits.
    pub fn from_hex(text: &str) -> CoreResult<Self> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let invalid = |reason: &str| CoreError::InvalidAddress {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        if digits.is_empty() {
            return Err(invalid("no hex digits"));
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("not hexadecimal"));
        }

        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| invalid("exceeds 64 bits"))
    }
}

impl FromStr for OriginalAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for OriginalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Allocation handed out by the allocator under test.
///
/// Carries the requested size alongside the pointer so allocators that need
/// it on release (anything built on `std::alloc`) can rebuild their layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiveAddress {
    ptr: NonNull<u8>,
    size: u64,
}

impl LiveAddress {
    /// Create a new live address
    #[must_use]
    pub const fn new(ptr: NonNull<u8>, size: u64) -> Self {
        Self { ptr, size }
    }

    /// Pointer returned by the allocator
    #[must_use]
    pub const fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Raw pointer returned by the allocator
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Numeric address, for diagnostics and range checks
    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Size that was requested for this allocation
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Display for LiveAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p} ({} bytes)", self.ptr, self.size)
    }
}
