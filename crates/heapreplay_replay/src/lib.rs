//! heapreplay Replay Engine
//!
//! Drives an allocator under test through a recorded allocation log.
//! Original addresses are translated to the live addresses the allocator
//! hands back, so frees always reach the matching allocation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod counting;
pub mod engine;
pub mod pool;
pub mod state;
pub mod system;
pub mod table;

pub use allocator::{AllocError, ReplayAllocator};
pub use counting::{AllocCall, AllocStats, CountingAllocator};
pub use engine::{
    AllocationFailurePolicy, ReplayConfig, ReplayEngine, ReplayError, ReplayPass, ReplayResult,
};
pub use pool::{PoolAllocator, PoolConfig};
pub use state::{ReplayState, ReplaySummary};
pub use system::{DEFAULT_ALIGNMENT, SystemAllocator};
pub use table::AddressTable;
