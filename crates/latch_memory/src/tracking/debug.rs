//! Debug tracker: full provenance for every block plus a leak report.
//!
//! Each raw block starts with padding followed by a `MemoryHeader` that sits
//! immediately before the caller's pointer:
//!
//! ```text
//! base                                  user pointer
//! |  padding  | MemoryHeader            | caller bytes ...
//! ```
//!
//! The padding keeps the user pointer aligned to the requested alignment.
//! Live blocks are also recorded in a map keyed by user address, so freeing a
//! pointer the tracker never handed out fails loudly before any header read.

use super::{TrackingPolicy, Untracked};
use crate::zone::Zone;
use std::collections::BTreeMap;
use std::mem::{align_of, size_of};
use std::panic::Location;
use std::ptr::NonNull;

const HEADER_GUARD: usize = 0xA110_C8ED;

#[repr(C)]
struct MemoryHeader {
    allocation_size: usize,
    allocation_index: usize,
    alignment: usize,
    location: &'static Location<'static>,
    guard: usize,
}

/// Record of a block that has not been freed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveAllocation {
    pub address: usize,
    pub size: usize,
    pub alignment: usize,
    pub index: usize,
    pub location: &'static Location<'static>,
}

/// Distance from the raw base to the caller's pointer.
fn header_offset(alignment: usize) -> usize {
    let align = alignment.max(align_of::<MemoryHeader>());
    size_of::<MemoryHeader>().div_ceil(align) * align
}

#[derive(Debug, Default)]
pub struct DebugTrackingPolicy {
    live: BTreeMap<usize, LiveAllocation>,
}

impl DebugTrackingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outstanding blocks ordered by allocation index.
    pub fn leaks(&self) -> Vec<LiveAllocation> {
        let mut leaks: Vec<_> = self.live.values().copied().collect();
        leaks.sort_by_key(|record| record.index);
        leaks
    }

    pub fn print_leaks(&self) {
        for leak in self.leaks() {
            tracing::error!(
                "*** MEMORY LEAK [addr={:#x}] [file={}] [line={}] [size={}] [alloc_num={}]",
                leak.address,
                leak.location.file(),
                leak.location.line(),
                leak.size,
                leak.index
            );
        }
    }
}

impl TrackingPolicy for DebugTrackingPolicy {
    fn request_size(&self, requested_size: usize, alignment: usize) -> usize {
        requested_size + header_offset(alignment)
    }

    fn base_alignment(&self, alignment: usize) -> usize {
        alignment.max(align_of::<MemoryHeader>())
    }

    unsafe fn track_allocation(
        &mut self,
        zone: &Zone,
        base: NonNull<u8>,
        requested_size: usize,
        alignment: usize,
        location: &'static Location<'static>,
    ) -> NonNull<u8> {
        let index = zone.next_allocation_id();

        // SAFETY: the block spans header_offset + requested_size bytes and the
        // header ends exactly at the user pointer, inside the padding region.
        let user = unsafe {
            let user = NonNull::new_unchecked(base.as_ptr().add(header_offset(alignment)));
            let header = user.as_ptr().sub(size_of::<MemoryHeader>()).cast::<MemoryHeader>();
            header.write(MemoryHeader {
                allocation_size: requested_size,
                allocation_index: index,
                alignment,
                location,
                guard: HEADER_GUARD,
            });
            user
        };

        let address = user.as_ptr() as usize;
        self.live.insert(
            address,
            LiveAllocation {
                address,
                size: requested_size,
                alignment,
                index,
                location,
            },
        );

        tracing::trace!(
            "[+] '{}' {:#x} size={}, align={}, line={}, alloc_num={}, file='{}'",
            zone.name(),
            address,
            requested_size,
            alignment,
            location.line(),
            index,
            location.file()
        );
        user
    }

    unsafe fn untrack_allocation(
        &mut self,
        zone: &Zone,
        pointer: NonNull<u8>,
        requested_size: usize,
    ) -> Untracked {
        let address = pointer.as_ptr() as usize;
        let record = self.live.remove(&address);
        assert!(
            record.is_some(),
            "zone '{}': freeing {:#x}, which this tracker never handed out (or already freed)",
            zone.name(),
            address
        );

        // SAFETY: the address is live, so a header written by track_allocation
        // precedes it.
        let header = unsafe {
            &mut *pointer
                .as_ptr()
                .sub(size_of::<MemoryHeader>())
                .cast::<MemoryHeader>()
        };
        assert_eq!(
            header.guard, HEADER_GUARD,
            "zone '{}': header before {:#x} is corrupted",
            zone.name(),
            address
        );
        assert_eq!(
            header.allocation_size, requested_size,
            "zone '{}': block {:#x} freed with the wrong size",
            zone.name(),
            address
        );
        header.guard = 0;

        tracing::trace!(
            "[-] '{}' {:#x} size={}, align={}, line={}, alloc_num={}",
            zone.name(),
            address,
            header.allocation_size,
            header.alignment,
            header.location.line(),
            header.allocation_index
        );

        Untracked {
            // SAFETY: inverse of the offset applied in track_allocation.
            base: unsafe {
                NonNull::new_unchecked(pointer.as_ptr().sub(header_offset(header.alignment)))
            },
            size: header.allocation_size,
        }
    }

    fn live_allocations(&self) -> Option<usize> {
        Some(self.live.len())
    }
}

impl Drop for DebugTrackingPolicy {
    fn drop(&mut self) {
        self.print_leaks();

        if std::thread::panicking() {
            return;
        }
        assert!(
            self.live.is_empty(),
            "debug tracker dropped with {} live allocations",
            self.live.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::{alloc, dealloc, Layout};

    fn raw_layout(policy: &DebugTrackingPolicy, size: usize, alignment: usize) -> Layout {
        Layout::from_size_align(
            policy.request_size(size, alignment),
            policy.base_alignment(alignment),
        )
        .unwrap()
    }

    #[test]
    fn header_sits_before_user_pointer_for_every_alignment() {
        let zone = Zone::unbounded("debug");
        let mut policy = DebugTrackingPolicy::new();

        for alignment in [1, 2, 8, 16, 32, 64, 256] {
            let layout = raw_layout(&policy, 40, alignment);
            unsafe {
                let base = NonNull::new(alloc(layout)).unwrap();
                let user =
                    policy.track_allocation(&zone, base, 40, alignment, Location::caller());

                assert_eq!(user.as_ptr() as usize % alignment, 0);
                assert_eq!(
                    user.as_ptr() as usize - base.as_ptr() as usize,
                    header_offset(alignment)
                );
                user.as_ptr().write_bytes(0xCD, 40);

                let untracked = policy.untrack_allocation(&zone, user, 40);
                assert_eq!(untracked.base, base);
                assert_eq!(untracked.size, 40);
                dealloc(base.as_ptr(), layout);
            }
        }
        assert_eq!(policy.live_allocations(), Some(0));
    }

    #[test]
    fn leaks_list_live_blocks_in_allocation_order() {
        let zone = Zone::unbounded("debug");
        let mut policy = DebugTrackingPolicy::new();
        let layout = raw_layout(&policy, 8, 8);

        unsafe {
            let first = NonNull::new(alloc(layout)).unwrap();
            let second = NonNull::new(alloc(layout)).unwrap();
            let first_user = policy.track_allocation(&zone, first, 8, 8, Location::caller());
            let second_user = policy.track_allocation(&zone, second, 8, 8, Location::caller());

            let leaks = policy.leaks();
            assert_eq!(leaks.len(), 2);
            assert_eq!(leaks[0].index, 0);
            assert_eq!(leaks[1].index, 1);
            assert_eq!(leaks[1].address, second_user.as_ptr() as usize);
            assert_eq!(leaks[0].location.file(), file!());

            policy.untrack_allocation(&zone, first_user, 8);
            policy.untrack_allocation(&zone, second_user, 8);
            dealloc(first.as_ptr(), layout);
            dealloc(second.as_ptr(), layout);
        }
        assert!(policy.leaks().is_empty());
    }

    #[test]
    #[should_panic(expected = "never handed out")]
    fn untracking_foreign_pointer_panics() {
        let zone = Zone::unbounded("debug");
        let mut policy = DebugTrackingPolicy::new();
        let mut foreign = [0u64; 8];
        let pointer = NonNull::new(foreign.as_mut_ptr().cast::<u8>()).unwrap();
        unsafe {
            policy.untrack_allocation(&zone, pointer, 8);
        }
    }

    #[test]
    #[should_panic(expected = "dropped with 1 live allocations")]
    fn dropping_with_live_blocks_panics() {
        let zone = Zone::unbounded("debug");
        let mut policy = DebugTrackingPolicy::new();
        let mut storage = [0u64; 16];
        let base = NonNull::new(storage.as_mut_ptr().cast::<u8>()).unwrap();
        unsafe {
            policy.track_allocation(&zone, base, 16, 8, Location::caller());
        }
        drop(policy);
    }
}
