// raw.rs - uninitialized, allocator-backed slot storage
//
// Containers track which slots are initialized; the buffer only owns the
// block and never drops elements on its own.

use latch_memory::{AllocError, MemoryAllocator, MemoryBlock};
use std::mem::{align_of, size_of};
use std::panic::Location;
use std::ptr::{self, NonNull};

pub(crate) struct RawBuffer<T> {
    data: NonNull<T>,
    capacity: usize,
    block: Option<MemoryBlock>,
}

impl<T> RawBuffer<T> {
    pub(crate) const fn new() -> Self {
        Self {
            data: NonNull::dangling(),
            capacity: 0,
            block: None,
        }
    }

    pub(crate) fn with_capacity<A: MemoryAllocator>(
        allocator: &A,
        capacity: usize,
        location: &'static Location<'static>,
    ) -> Result<Self, AllocError> {
        if capacity == 0 {
            return Ok(Self::new());
        }
        let bytes = size_of::<T>()
            .checked_mul(capacity)
            .ok_or(AllocError::InvalidLayout {
                size: usize::MAX,
                alignment: align_of::<T>(),
            })?;
        let block = allocator.allocate(bytes, align_of::<T>(), location)?;
        Ok(Self {
            data: block.cast::<T>(),
            capacity,
            block: Some(block),
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn is_allocated(&self) -> bool {
        self.block.is_some()
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut T {
        self.data.as_ptr()
    }

    /// # Safety
    /// `index < capacity` and the slot must not hold a live value.
    #[inline]
    pub(crate) unsafe fn write(&mut self, index: usize, value: T) {
        debug_assert!(index < self.capacity);
        // SAFETY: forwarded from the caller.
        unsafe { self.data.as_ptr().add(index).write(value) }
    }

    /// Move the live value out of `index`, leaving the slot uninitialized.
    ///
    /// # Safety
    /// `index < capacity` and the slot must hold a live value.
    #[inline]
    pub(crate) unsafe fn read(&self, index: usize) -> T {
        debug_assert!(index < self.capacity);
        // SAFETY: forwarded from the caller.
        unsafe { self.data.as_ptr().add(index).read() }
    }

    /// # Safety
    /// Slots `0..len` must be initialized and `len <= capacity`.
    #[inline]
    pub(crate) unsafe fn slice(&self, len: usize) -> &[T] {
        // SAFETY: forwarded from the caller.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), len) }
    }

    /// # Safety
    /// Slots `0..len` must be initialized and `len <= capacity`.
    #[inline]
    pub(crate) unsafe fn slice_mut(&mut self, len: usize) -> &mut [T] {
        // SAFETY: forwarded from the caller.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), len) }
    }

    /// Drop slots `0..len` in reverse index order.
    ///
    /// # Safety
    /// Slots `0..len` must be initialized; they are uninitialized afterwards.
    pub(crate) unsafe fn drop_range(&mut self, len: usize) {
        for index in (0..len).rev() {
            // SAFETY: each live slot is dropped exactly once.
            unsafe { ptr::drop_in_place(self.data.as_ptr().add(index)) };
        }
    }

    /// Bitwise-move the first `len` values into `other`.
    ///
    /// # Safety
    /// Slots `0..len` must be initialized here and free in `other`; afterwards
    /// they count as uninitialized here.
    pub(crate) unsafe fn move_into(&self, other: &mut RawBuffer<T>, len: usize) {
        debug_assert!(len <= other.capacity);
        // SAFETY: distinct blocks, both spanning at least `len` slots.
        unsafe { ptr::copy_nonoverlapping(self.data.as_ptr(), other.data.as_ptr(), len) }
    }

    /// Return the block to `allocator` without touching element lifetimes.
    ///
    /// # Safety
    /// `allocator` must be the one that produced this buffer and no slot may
    /// still hold a value that needs dropping.
    pub(crate) unsafe fn release<A: MemoryAllocator>(&mut self, allocator: &A) {
        let block = self.block.take();
        self.data = NonNull::dangling();
        self.capacity = 0;
        // SAFETY: forwarded from the caller.
        unsafe { allocator.release(block) };
    }
}

/// Containers have no graceful failure path; an allocation failure is fatal.
#[cold]
#[track_caller]
pub(crate) fn allocation_failed(container: &str, err: AllocError) -> ! {
    panic!("{container}: allocation failed: {err}")
}
