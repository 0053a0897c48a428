//! Raw heaps: the only code that talks to the underlying allocation
//! primitives. Both honor the alignment carried in the `Layout`, so
//! over-aligned requests need no platform-specific aligned malloc.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;

/// Source of raw, untracked memory.
pub trait RawHeap: Default {
    /// Short name used in diagnostics.
    const NAME: &'static str;

    /// Returns null when the heap is exhausted.
    ///
    /// # Safety
    /// `layout` must have a non-zero size.
    unsafe fn allocate(&self, layout: Layout) -> *mut u8;

    /// # Safety
    /// `pointer` must come from `allocate` on this heap with the same `layout`.
    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout);
}

/// The platform allocator, bypassing any `#[global_allocator]` override.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHeap;

impl RawHeap for SystemHeap {
    const NAME: &'static str = "system";

    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        // SAFETY: the caller guarantees a non-zero layout.
        unsafe { System.alloc(layout) }
    }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
        // SAFETY: the pointer came from System.alloc with this layout.
        unsafe { System.dealloc(pointer.as_ptr(), layout) }
    }
}

/// Whatever allocator the process registered as global.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalHeap;

impl RawHeap for GlobalHeap {
    const NAME: &'static str = "heap";

    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        // SAFETY: the caller guarantees a non-zero layout.
        unsafe { std::alloc::alloc(layout) }
    }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
        // SAFETY: the pointer came from std::alloc::alloc with this layout.
        unsafe { std::alloc::dealloc(pointer.as_ptr(), layout) }
    }
}
