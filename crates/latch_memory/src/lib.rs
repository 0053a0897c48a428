//! Latch Engine Memory
//!
//! Zone-tagged allocation for the engine:
//! - Zones (named accounting buckets with optional budgets)
//! - Tracking policies (none, or full provenance with leak reports)
//! - Zone allocators over the platform and global heaps
//! - Typed construction helpers for arrays and single objects
//!
//! Nothing in this crate is thread-safe. Share an allocator or zone across
//! threads only behind an external lock; the types are `!Sync` to enforce it.

pub mod allocator;
pub mod context;
pub mod error;
pub mod heap;
pub mod tracking;
pub mod typed;
pub mod zone;

pub use allocator::{
    GlobalAllocatorType, HeapAllocator, MemoryAllocator, MemoryBlock, SystemAllocator,
    SystemAllocatorType, ZoneAllocator,
};
pub use context::MemoryContext;
pub use error::{AllocError, ZoneError};
pub use heap::{GlobalHeap, RawHeap, SystemHeap};
pub use tracking::{DebugTrackingPolicy, DefaultTrackingPolicy, SimpleTrackingPolicy, TrackingPolicy};
pub use typed::{
    construct, construct_array, construct_array_with, construct_zeroed_array, destruct,
    destruct_array, ArrayBlock, ObjectBlock,
};
pub use zone::{Zone, ZoneStats};

pub const KILOBYTE: usize = 1024;
pub const MEGABYTE: usize = KILOBYTE * 1024;
pub const GIGABYTE: usize = MEGABYTE * 1024;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn size_units_scale_by_1024() {
        assert_eq!(MEGABYTE, 1024 * KILOBYTE);
        assert_eq!(GIGABYTE, 1024 * MEGABYTE);
    }
}
