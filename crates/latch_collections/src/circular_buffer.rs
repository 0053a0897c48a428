//! Ring of `N` scratch slots.
//!
//! `next` hands out the slot under the cursor and advances it, wrapping at
//! `N`. Old contents are overwritten by whoever takes the slot; there is no
//! notion of a reader.

use crate::fixed_array::FixedArray;
use crate::raw::allocation_failed;
use latch_memory::{AllocError, MemoryAllocator};
use std::ops::{Index, IndexMut};

pub struct CircularBuffer<T, A: MemoryAllocator, const N: usize> {
    slots: FixedArray<T, A>,
    index: usize,
}

impl<T: Default, A: MemoryAllocator, const N: usize> CircularBuffer<T, A, N> {
    #[track_caller]
    pub fn try_new(allocator: A) -> Result<Self, AllocError> {
        assert!(N > 0, "CircularBuffer needs at least one slot");
        let mut slots = FixedArray::new(allocator);
        slots.allocate_with(N, |_| T::default())?;
        Ok(Self { slots, index: 0 })
    }

    #[track_caller]
    pub fn new(allocator: A) -> Self {
        match Self::try_new(allocator) {
            Ok(buffer) => buffer,
            Err(err) => allocation_failed("CircularBuffer", err),
        }
    }
}

impl<T, A: MemoryAllocator, const N: usize> CircularBuffer<T, A, N> {
    /// Slot under the cursor; the cursor then moves on.
    pub fn next(&mut self) -> &mut T {
        let current = self.index;
        self.index = (self.index + 1) % N;
        &mut self.slots[current]
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Index the next call to [`CircularBuffer::next`] will return.
    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn get_item(&self, index: usize) -> &T {
        &self.slots[index]
    }

    pub const fn size(&self) -> usize {
        N
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }
}

impl<T, A: MemoryAllocator, const N: usize> Index<usize> for CircularBuffer<T, A, N> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.slots[index]
    }
}

impl<T, A: MemoryAllocator, const N: usize> IndexMut<usize> for CircularBuffer<T, A, N> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.slots[index]
    }
}

impl<T: Clone, A: MemoryAllocator + Clone, const N: usize> Clone for CircularBuffer<T, A, N> {
    #[track_caller]
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            index: self.index,
        }
    }
}
