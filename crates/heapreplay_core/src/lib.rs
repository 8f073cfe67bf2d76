//! heapreplay core types
//!
//! Pure types with no I/O: the two address spaces that meet during a
//! replay, and the errors shared by the rest of the workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod error;

// Re-exports
pub use address::{LiveAddress, OriginalAddress};
pub use error::{CoreError, CoreResult};
