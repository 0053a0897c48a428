//! Explicitly constructed allocator/zone bundle handed to subsystems.
//!
//! Engine code receives a `MemoryContext` (or one of its allocators) instead
//! of reaching for process-wide state.

use crate::allocator::{GlobalAllocatorType, MemoryAllocator, SystemAllocatorType};
use crate::zone::Zone;
use std::rc::Rc;

#[derive(Debug)]
pub struct MemoryContext {
    allocator: Rc<GlobalAllocatorType>,
    system_allocator: Rc<SystemAllocatorType>,
}

impl MemoryContext {
    pub fn new(global_zone: Zone, system_zone: Zone) -> Self {
        tracing::info!(
            global = %global_zone.name(),
            system = %system_zone.name(),
            "memory context created"
        );
        Self {
            allocator: Rc::new(GlobalAllocatorType::new(Rc::new(global_zone))),
            system_allocator: Rc::new(SystemAllocatorType::new(Rc::new(system_zone))),
        }
    }

    /// Both allocators reporting to one shared zone.
    pub fn with_shared_zone(zone: Zone) -> Self {
        let zone = Rc::new(zone);
        Self {
            allocator: Rc::new(GlobalAllocatorType::new(Rc::clone(&zone))),
            system_allocator: Rc::new(SystemAllocatorType::new(zone)),
        }
    }

    /// General-purpose allocator for engine subsystems.
    pub fn allocator(&self) -> &Rc<GlobalAllocatorType> {
        &self.allocator
    }

    /// Allocator that goes straight to the platform heap.
    pub fn system_allocator(&self) -> &Rc<SystemAllocatorType> {
        &self.system_allocator
    }

    pub fn global_zone(&self) -> &Zone {
        self.allocator.zone()
    }

    pub fn system_zone(&self) -> &Zone {
        self.system_allocator.zone()
    }

    /// Tear down both allocators, reporting their zones.
    ///
    /// Panics if a container or subsystem still holds one of the allocators.
    pub fn shutdown(self) {
        let Self {
            allocator,
            system_allocator,
        } = self;

        let allocator = Rc::try_unwrap(allocator)
            .unwrap_or_else(|_| panic!("global allocator still referenced at shutdown"));
        let system_allocator = Rc::try_unwrap(system_allocator)
            .unwrap_or_else(|_| panic!("system allocator still referenced at shutdown"));

        tracing::info!("memory context shutting down");
        drop(allocator);
        drop(system_allocator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocators_report_to_their_zones() {
        let context = MemoryContext::new(Zone::unbounded("global"), Zone::unbounded("system"));
        let a = context.allocator().alloc_bytes(64, 8).unwrap();
        let b = context.system_allocator().alloc_bytes(32, 8).unwrap();

        assert_eq!(context.global_zone().active_allocations(), 1);
        assert_eq!(context.system_zone().active_allocations(), 1);
        assert_eq!(context.global_zone().name(), "global");

        unsafe {
            context.allocator().deallocate(a);
            context.system_allocator().deallocate(b);
        }
        context.shutdown();
    }

    #[test]
    fn shared_zone_aggregates_both_allocators() {
        let context = MemoryContext::with_shared_zone(Zone::unbounded("shared"));
        let a = context.allocator().alloc_bytes(16, 8).unwrap();
        let b = context.system_allocator().alloc_bytes(16, 8).unwrap();
        assert_eq!(context.global_zone().active_allocations(), 2);
        assert!(std::ptr::eq(context.global_zone(), context.system_zone()));
        unsafe {
            context.allocator().deallocate(a);
            context.system_allocator().deallocate(b);
        }
        context.shutdown();
    }

    #[test]
    #[should_panic(expected = "still referenced at shutdown")]
    fn shutdown_with_outstanding_handle_panics() {
        let context = MemoryContext::new(Zone::unbounded("global"), Zone::unbounded("system"));
        let _held = Rc::clone(context.allocator());
        context.shutdown();
    }
}
