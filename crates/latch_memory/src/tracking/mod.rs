//! Tracking policies decorate raw blocks with bookkeeping.
//!
//! The allocator asks its policy how many real bytes a request needs, lets
//! it stamp metadata over the raw block, and hands the caller whatever
//! pointer the policy returns. Freeing runs the same steps in reverse.

mod debug;
mod simple;

pub use debug::{DebugTrackingPolicy, LiveAllocation};
pub use simple::SimpleTrackingPolicy;

use crate::zone::Zone;
use std::panic::Location;
use std::ptr::NonNull;

/// Policy active for the engine's default allocators.
///
/// Selected at compile time with the `debug-tracking` feature.
#[cfg(not(feature = "debug-tracking"))]
pub type DefaultTrackingPolicy = SimpleTrackingPolicy;

#[cfg(feature = "debug-tracking")]
pub type DefaultTrackingPolicy = DebugTrackingPolicy;

/// Result of untracking: the raw block to hand back to the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Untracked {
    pub base: NonNull<u8>,
    /// Logical size originally requested by the caller.
    pub size: usize,
}

pub trait TrackingPolicy: Default {
    /// Real bytes to allocate for a logical request.
    fn request_size(&self, requested_size: usize, alignment: usize) -> usize;

    /// Alignment the raw block needs so that the returned pointer honors
    /// `alignment`.
    fn base_alignment(&self, alignment: usize) -> usize {
        alignment
    }

    /// Stamp metadata over a fresh raw block and return the caller's pointer.
    ///
    /// # Safety
    /// `base` must point to at least `request_size(requested_size, alignment)`
    /// writable bytes aligned to `base_alignment(alignment)`.
    unsafe fn track_allocation(
        &mut self,
        zone: &Zone,
        base: NonNull<u8>,
        requested_size: usize,
        alignment: usize,
        location: &'static Location<'static>,
    ) -> NonNull<u8>;

    /// Recover the raw block behind a pointer returned by `track_allocation`.
    ///
    /// `requested_size` is the size the caller believes it is freeing; a
    /// policy that stores no size relies on it.
    ///
    /// # Safety
    /// `pointer` must have come from `track_allocation` on this policy and
    /// must not have been untracked already.
    unsafe fn untrack_allocation(
        &mut self,
        zone: &Zone,
        pointer: NonNull<u8>,
        requested_size: usize,
    ) -> Untracked;

    /// Number of blocks currently tracked, when the policy keeps count.
    fn live_allocations(&self) -> Option<usize> {
        None
    }
}
