use super::{TrackingPolicy, Untracked};
use crate::zone::Zone;
use std::panic::Location;
use std::ptr::NonNull;

/// No header and no records: the caller's pointer is the raw block.
///
/// Freeing trusts the size carried by the caller's `MemoryBlock`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleTrackingPolicy;

impl TrackingPolicy for SimpleTrackingPolicy {
    #[inline]
    fn request_size(&self, requested_size: usize, _alignment: usize) -> usize {
        requested_size
    }

    #[inline]
    unsafe fn track_allocation(
        &mut self,
        _zone: &Zone,
        base: NonNull<u8>,
        _requested_size: usize,
        _alignment: usize,
        _location: &'static Location<'static>,
    ) -> NonNull<u8> {
        base
    }

    #[inline]
    unsafe fn untrack_allocation(
        &mut self,
        _zone: &Zone,
        pointer: NonNull<u8>,
        requested_size: usize,
    ) -> Untracked {
        Untracked {
            base: pointer,
            size: requested_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_sizes_and_pointers_through() {
        let zone = Zone::unbounded("simple");
        let mut policy = SimpleTrackingPolicy;
        assert_eq!(policy.request_size(48, 16), 48);

        let mut storage = [0u8; 48];
        let base = NonNull::new(storage.as_mut_ptr()).unwrap();
        unsafe {
            let user = policy.track_allocation(&zone, base, 48, 1, Location::caller());
            assert_eq!(user, base);
            let untracked = policy.untrack_allocation(&zone, user, 48);
            assert_eq!(untracked, Untracked { base, size: 48 });
        }
        assert_eq!(policy.live_allocations(), None);
    }
}
