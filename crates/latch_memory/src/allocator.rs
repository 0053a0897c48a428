//! Zone allocators.
//!
//! An allocator composes a raw heap, a tracking policy and the zone it
//! reports to. Many allocators may report to the same zone to aggregate
//! statistics, but each owns its own policy instance.

use crate::error::AllocError;
use crate::heap::{GlobalHeap, RawHeap, SystemHeap};
use crate::tracking::{DefaultTrackingPolicy, TrackingPolicy};
use crate::zone::Zone;
use std::alloc::Layout;
use std::cell::{Ref, RefCell};
use std::panic::Location;
use std::ptr::NonNull;
use std::rc::Rc;

/// A block handed out by an allocator.
///
/// Carries the logical size and alignment alongside the pointer so freeing
/// never depends on hidden bookkeeping. Not `Clone`: a block is freed once.
#[derive(Debug, PartialEq, Eq)]
pub struct MemoryBlock {
    pointer: NonNull<u8>,
    size: usize,
    alignment: usize,
}

impl MemoryBlock {
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.pointer.as_ptr()
    }

    #[inline]
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.pointer
    }

    #[inline]
    pub fn cast<T>(&self) -> NonNull<T> {
        self.pointer.cast()
    }

    /// Bytes requested by the caller (excluding any tracking overhead).
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }
}

/// Interface every engine subsystem allocates through.
pub trait MemoryAllocator {
    /// Allocate `size` bytes aligned to `alignment` (a power of two).
    ///
    /// A budget rejection from the zone comes back as
    /// [`AllocError::BudgetExceeded`]; the raw block is already released.
    fn allocate(
        &self,
        size: usize,
        alignment: usize,
        location: &'static Location<'static>,
    ) -> Result<MemoryBlock, AllocError>;

    /// # Safety
    /// `block` must have been returned by `allocate` on this allocator.
    unsafe fn deallocate(&self, block: MemoryBlock);

    /// Zone this allocator reports to.
    fn zone(&self) -> &Zone;

    /// `allocate`, recording the caller as the source location.
    #[track_caller]
    fn alloc_bytes(&self, size: usize, alignment: usize) -> Result<MemoryBlock, AllocError> {
        self.allocate(size, alignment, Location::caller())
    }

    /// Free an optional block; `None` is a no-op.
    ///
    /// # Safety
    /// Same contract as [`MemoryAllocator::deallocate`].
    unsafe fn release(&self, block: Option<MemoryBlock>) {
        if let Some(block) = block {
            // SAFETY: forwarded from the caller.
            unsafe { self.deallocate(block) }
        }
    }
}

impl<A: MemoryAllocator + ?Sized> MemoryAllocator for &A {
    #[inline]
    fn allocate(
        &self,
        size: usize,
        alignment: usize,
        location: &'static Location<'static>,
    ) -> Result<MemoryBlock, AllocError> {
        (**self).allocate(size, alignment, location)
    }

    #[inline]
    unsafe fn deallocate(&self, block: MemoryBlock) {
        // SAFETY: forwarded from the caller.
        unsafe { (**self).deallocate(block) }
    }

    #[inline]
    fn zone(&self) -> &Zone {
        (**self).zone()
    }
}

impl<A: MemoryAllocator + ?Sized> MemoryAllocator for Rc<A> {
    #[inline]
    fn allocate(
        &self,
        size: usize,
        alignment: usize,
        location: &'static Location<'static>,
    ) -> Result<MemoryBlock, AllocError> {
        (**self).allocate(size, alignment, location)
    }

    #[inline]
    unsafe fn deallocate(&self, block: MemoryBlock) {
        // SAFETY: forwarded from the caller.
        unsafe { (**self).deallocate(block) }
    }

    #[inline]
    fn zone(&self) -> &Zone {
        (**self).zone()
    }
}

/// Allocator over heap `H` with tracking policy `P`, reporting to a zone.
#[derive(Debug)]
pub struct ZoneAllocator<H: RawHeap, P: TrackingPolicy> {
    // Dropped first so per-block leak reports precede the zone summary.
    policy: RefCell<P>,
    heap: H,
    zone: Rc<Zone>,
}

/// Allocator over the platform allocator.
pub type SystemAllocator<P = DefaultTrackingPolicy> = ZoneAllocator<SystemHeap, P>;

/// Allocator over the process global allocator.
pub type HeapAllocator<P = DefaultTrackingPolicy> = ZoneAllocator<GlobalHeap, P>;

pub type SystemAllocatorType = SystemAllocator<DefaultTrackingPolicy>;
pub type GlobalAllocatorType = HeapAllocator<DefaultTrackingPolicy>;

impl<H: RawHeap, P: TrackingPolicy> ZoneAllocator<H, P> {
    pub fn new(zone: Rc<Zone>) -> Self {
        Self::with_parts(zone, H::default(), P::default())
    }

    pub fn with_parts(zone: Rc<Zone>, heap: H, policy: P) -> Self {
        tracing::debug!(zone = %zone.name(), heap = H::NAME, "allocator created");
        Self {
            policy: RefCell::new(policy),
            heap,
            zone,
        }
    }

    /// Shared handle to the zone, for building sibling allocators.
    pub fn zone_handle(&self) -> &Rc<Zone> {
        &self.zone
    }

    /// Borrow the tracking policy, e.g. to inspect live blocks.
    pub fn policy(&self) -> Ref<'_, P> {
        self.policy.borrow()
    }

    fn raw_layout(policy: &P, size: usize, alignment: usize) -> Result<Layout, AllocError> {
        let invalid = AllocError::InvalidLayout { size, alignment };
        if !alignment.is_power_of_two() || size > isize::MAX as usize {
            return Err(invalid);
        }
        let real_size = policy.request_size(size, alignment);
        Layout::from_size_align(real_size.max(1), policy.base_alignment(alignment))
            .map_err(|_| invalid)
    }
}

impl<H: RawHeap, P: TrackingPolicy> MemoryAllocator for ZoneAllocator<H, P> {
    fn allocate(
        &self,
        size: usize,
        alignment: usize,
        location: &'static Location<'static>,
    ) -> Result<MemoryBlock, AllocError> {
        let mut policy = self.policy.borrow_mut();
        let layout = Self::raw_layout(&policy, size, alignment)?;
        let real_size = policy.request_size(size, alignment);

        // SAFETY: raw_layout never yields a zero-sized layout.
        let base = NonNull::new(unsafe { self.heap.allocate(layout) }).ok_or(
            AllocError::OutOfMemory {
                size: real_size,
                alignment,
            },
        )?;

        // SAFETY: base spans `layout`, which is what the policy asked for.
        let pointer =
            unsafe { policy.track_allocation(&self.zone, base, size, alignment, location) };

        if let Err(err) = self.zone.add_allocation(real_size) {
            // The heap handed us memory the zone will not pay for; give it back.
            // SAFETY: pointer was tracked just above and never escaped.
            unsafe {
                let untracked = policy.untrack_allocation(&self.zone, pointer, size);
                self.heap.deallocate(untracked.base, layout);
            }
            tracing::warn!(
                zone = %self.zone.name(),
                size,
                file = location.file(),
                line = location.line(),
                "allocation rejected: {err}"
            );
            return Err(err.into());
        }

        Ok(MemoryBlock {
            pointer,
            size,
            alignment,
        })
    }

    unsafe fn deallocate(&self, block: MemoryBlock) {
        let mut policy = self.policy.borrow_mut();

        // SAFETY: the caller guarantees the block came from this allocator.
        let untracked =
            unsafe { policy.untrack_allocation(&self.zone, block.pointer, block.size) };
        let real_size = policy.request_size(untracked.size, block.alignment);
        self.zone.remove_allocation(real_size);

        // SAFETY: identical to the layout built by allocate for this block.
        unsafe {
            let layout = Layout::from_size_align_unchecked(
                real_size.max(1),
                policy.base_alignment(block.alignment),
            );
            self.heap.deallocate(untracked.base, layout);
        }
    }

    fn zone(&self) -> &Zone {
        &self.zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{DebugTrackingPolicy, SimpleTrackingPolicy};

    fn budgeted(budget: usize) -> Rc<Zone> {
        Rc::new(Zone::new("test", budget))
    }

    fn round_trip<A: MemoryAllocator>(allocator: &A) {
        for alignment in [1, 4, 8, 16, 64, 4096] {
            for size in [0, 1, 7, 64, 1000] {
                let before = allocator.zone().stats();
                let block = allocator.alloc_bytes(size, alignment).unwrap();
                assert_eq!(block.as_ptr() as usize % alignment, 0);
                assert_eq!(block.size(), size);
                unsafe {
                    block.as_ptr().write_bytes(0x5A, size);
                    allocator.deallocate(block);
                }
                let after = allocator.zone().stats();
                assert_eq!(after.active_allocations, before.active_allocations);
                assert_eq!(after.active_bytes, before.active_bytes);
            }
        }
    }

    #[test]
    fn round_trip_restores_zone_with_simple_policy() {
        let allocator = HeapAllocator::<SimpleTrackingPolicy>::new(budgeted(0));
        round_trip(&allocator);
        assert!(allocator.zone().is_balanced());
    }

    #[test]
    fn round_trip_restores_zone_with_debug_policy() {
        let allocator = SystemAllocator::<DebugTrackingPolicy>::new(budgeted(0));
        round_trip(&allocator);
        assert_eq!(allocator.policy().live_allocations(), Some(0));
    }

    #[test]
    fn budget_scenario() {
        let allocator = HeapAllocator::<SimpleTrackingPolicy>::new(budgeted(1024));

        let first = allocator.alloc_bytes(512, 8).unwrap();
        assert_eq!(allocator.zone().active_bytes(), 512);

        let err = allocator.alloc_bytes(600, 8).unwrap_err();
        assert!(err.is_budget_exceeded());
        assert_eq!(allocator.zone().active_bytes(), 512);
        assert_eq!(allocator.zone().active_allocations(), 1);

        unsafe { allocator.deallocate(first) };
        assert_eq!(allocator.zone().active_bytes(), 0);
    }

    #[test]
    fn rejected_allocation_is_untracked_and_freed() {
        let allocator = HeapAllocator::<DebugTrackingPolicy>::new(budgeted(64));
        let err = allocator.alloc_bytes(128, 8).unwrap_err();
        assert!(matches!(err, AllocError::BudgetExceeded(_)));
        assert_eq!(allocator.policy().live_allocations(), Some(0));
        assert_eq!(allocator.zone().total_allocations(), 0);
    }

    #[test]
    fn debug_policy_charges_header_bytes_to_zone() {
        let allocator = HeapAllocator::<DebugTrackingPolicy>::new(budgeted(0));
        let block = allocator.alloc_bytes(100, 8).unwrap();
        assert!(allocator.zone().active_bytes() > 100);
        assert_eq!(allocator.policy().leaks()[0].location.file(), file!());
        unsafe { allocator.deallocate(block) };
        assert!(allocator.zone().is_balanced());
    }

    #[test]
    fn allocators_sharing_a_zone_aggregate() {
        let zone = budgeted(0);
        let system = SystemAllocator::<SimpleTrackingPolicy>::new(Rc::clone(&zone));
        let heap = HeapAllocator::<DebugTrackingPolicy>::new(Rc::clone(&zone));

        let a = system.alloc_bytes(32, 8).unwrap();
        let b = heap.alloc_bytes(32, 8).unwrap();
        assert_eq!(zone.active_allocations(), 2);
        assert_eq!(heap.policy().live_allocations(), Some(1));

        unsafe {
            system.deallocate(a);
            heap.deallocate(b);
        }
        assert!(zone.is_balanced());
    }

    #[test]
    fn invalid_alignment_is_rejected() {
        let allocator = HeapAllocator::<SimpleTrackingPolicy>::new(budgeted(0));
        for alignment in [0, 3, 24] {
            let err = allocator.alloc_bytes(16, alignment).unwrap_err();
            assert_eq!(err, AllocError::InvalidLayout { size: 16, alignment });
        }
        assert_eq!(allocator.zone().total_allocations(), 0);
    }

    #[test]
    fn releasing_none_is_a_no_op() {
        let allocator = HeapAllocator::<SimpleTrackingPolicy>::new(budgeted(0));
        unsafe { allocator.release(None) };
        let block = allocator.alloc_bytes(8, 8).unwrap();
        unsafe { allocator.release(Some(block)) };
        assert!(allocator.zone().is_balanced());
    }

    #[test]
    fn works_through_rc_and_references() {
        let allocator = Rc::new(HeapAllocator::<SimpleTrackingPolicy>::new(budgeted(0)));
        round_trip(&Rc::clone(&allocator));
        round_trip(&&*allocator);
    }

    #[test]
    #[should_panic(expected = "never handed out")]
    fn double_free_is_caught_by_debug_policy() {
        let allocator = HeapAllocator::<DebugTrackingPolicy>::new(budgeted(0));
        let block = allocator.alloc_bytes(16, 8).unwrap();
        let forged = MemoryBlock {
            pointer: block.pointer,
            size: block.size,
            alignment: block.alignment,
        };
        unsafe {
            allocator.deallocate(block);
            allocator.deallocate(forged);
        }
    }
}
