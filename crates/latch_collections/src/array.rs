//! Growable array over a [`MemoryAllocator`].
//!
//! Grows geometrically: the first growth allocates
//! [`ARRAY_DEFAULT_CAPACITY`] slots, every later one doubles. Growth moves the
//! live elements into the new block and frees the old one.

use crate::raw::{allocation_failed, RawBuffer};
use latch_memory::{AllocError, MemoryAllocator};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::panic::Location;

pub const ARRAY_DEFAULT_CAPACITY: usize = 16;

pub struct Array<T, A: MemoryAllocator> {
    buffer: RawBuffer<T>,
    len: usize,
    allocator: A,
}

impl<T, A: MemoryAllocator> Array<T, A> {
    /// Empty array; nothing is allocated until the first push.
    pub fn new(allocator: A) -> Self {
        Self {
            buffer: RawBuffer::new(),
            len: 0,
            allocator,
        }
    }

    #[track_caller]
    pub fn with_capacity(allocator: A, capacity: usize) -> Self {
        let mut array = Self::new(allocator);
        array.reserve(capacity);
        array
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    // grow to capacity
    #[track_caller]
    fn grow(&mut self, capacity: usize) -> Result<(), AllocError> {
        if capacity <= self.buffer.capacity() {
            return Ok(());
        }

        let previous = self.buffer.capacity();
        let mut expanded = RawBuffer::with_capacity(&self.allocator, capacity, Location::caller())?;
        // SAFETY: 0..len are live in the old buffer and move to the new one.
        unsafe {
            self.buffer.move_into(&mut expanded, self.len);
            self.buffer.release(&self.allocator);
        }

        tracing::debug!(
            from = previous,
            to = capacity,
            len = self.len,
            "array grew"
        );
        self.buffer = expanded;
        Ok(())
    }

    #[track_caller]
    pub fn try_reserve(&mut self, capacity: usize) -> Result<(), AllocError> {
        self.grow(capacity)
    }

    /// Make room for at least `capacity` elements in total.
    #[track_caller]
    pub fn reserve(&mut self, capacity: usize) {
        if let Err(err) = self.grow(capacity) {
            allocation_failed("Array", err);
        }
    }

    #[track_caller]
    pub fn try_push(&mut self, item: T) -> Result<(), AllocError> {
        if self.len >= self.buffer.capacity() {
            let next = match self.buffer.capacity() {
                0 => ARRAY_DEFAULT_CAPACITY,
                capacity => capacity * 2,
            };
            self.grow(next)?;
        }

        // SAFETY: len < capacity and slot len is free.
        unsafe { self.buffer.write(self.len, item) };
        self.len += 1;
        Ok(())
    }

    /// Append `item`. Allocation failure is fatal.
    #[track_caller]
    pub fn push_back(&mut self, item: T) {
        if let Err(err) = self.try_push(item) {
            allocation_failed("Array", err);
        }
    }

    /// Remove and return the last element. Panics when empty.
    pub fn pop_back(&mut self) -> T {
        assert!(self.len > 0, "pop_back on an empty Array");
        self.len -= 1;
        // SAFETY: slot len was live and is no longer counted.
        unsafe { self.buffer.read(self.len) }
    }

    /// Grow to `count` elements, filling new slots with `T::default()`.
    ///
    /// Unlike `Vec::resize`, a smaller `count` never removes elements.
    #[track_caller]
    pub fn resize(&mut self, count: usize)
    where
        T: Default + Clone,
    {
        self.resize_with_value(count, T::default());
    }

    /// Grow to `count` elements, filling new slots with clones of
    /// `default_value`. Existing elements are left untouched and a smaller
    /// `count` is a no-op.
    #[track_caller]
    pub fn resize_with_value(&mut self, count: usize, default_value: T)
    where
        T: Clone,
    {
        if count <= self.len {
            return;
        }

        self.reserve(count);
        while self.len < count {
            // SAFETY: len < count <= capacity.
            unsafe { self.buffer.write(self.len, default_value.clone()) };
            self.len += 1;
        }
    }

    #[track_caller]
    pub fn extend_from_slice(&mut self, items: &[T])
    where
        T: Clone,
    {
        self.reserve(self.len + items.len());
        for item in items {
            self.push_back(item.clone());
        }
    }

    pub fn swap(&mut self, index: usize, other: usize) {
        self.as_mut_slice().swap(index, other);
    }

    /// Remove every element equal to `element`, shifting the rest down.
    pub fn erase(&mut self, element: &T)
    where
        T: PartialEq,
    {
        let len = self.len;
        // Leak rather than double-drop if `eq` panics midway.
        self.len = 0;

        let base = self.buffer.as_mut_ptr();
        let mut kept = 0;
        for index in 0..len {
            // SAFETY: slots kept..index are vacated, index..len are live.
            unsafe {
                let item = base.add(index);
                if *item == *element {
                    std::ptr::drop_in_place(item);
                } else {
                    if kept != index {
                        std::ptr::copy_nonoverlapping(item, base.add(kept), 1);
                    }
                    kept += 1;
                }
            }
        }
        self.len = kept;
    }

    /// Drop every element and free the buffer.
    pub fn clear(&mut self) {
        self.clear_keep_capacity();
        // SAFETY: no live elements remain.
        unsafe { self.buffer.release(&self.allocator) };
    }

    /// Drop every element but keep the buffer for reuse.
    pub fn clear_keep_capacity(&mut self) {
        let len = std::mem::replace(&mut self.len, 0);
        // SAFETY: 0..len were live.
        unsafe { self.buffer.drop_range(len) };
    }

    pub fn back(&self) -> Option<&T> {
        self.as_slice().last()
    }

    pub fn back_mut(&mut self) -> Option<&mut T> {
        self.as_mut_slice().last_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: 0..len are live.
        unsafe { self.buffer.slice(self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: 0..len are live.
        unsafe { self.buffer.slice_mut(self.len) }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }
}

impl<T, A: MemoryAllocator> Drop for Array<T, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, A: MemoryAllocator> Index<usize> for Array<T, A> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(index < self.len, "Array index {index} out of bounds (len {})", self.len);
        &self.as_slice()[index]
    }
}

impl<T, A: MemoryAllocator> IndexMut<usize> for Array<T, A> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        assert!(index < self.len, "Array index {index} out of bounds (len {})", self.len);
        &mut self.as_mut_slice()[index]
    }
}

/// Deep copy: every element is cloned into a fresh block of equal capacity.
impl<T: Clone, A: MemoryAllocator + Clone> Clone for Array<T, A> {
    #[track_caller]
    fn clone(&self) -> Self {
        let mut copy = Self::with_capacity(self.allocator.clone(), self.capacity());
        for item in self.iter() {
            copy.push_back(item.clone());
        }
        copy
    }
}

impl<T: PartialEq, A: MemoryAllocator, B: MemoryAllocator> PartialEq<Array<T, B>> for Array<T, A> {
    fn eq(&self, other: &Array<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: fmt::Debug, A: MemoryAllocator> fmt::Debug for Array<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T, A: MemoryAllocator> IntoIterator for &'a Array<T, A> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: MemoryAllocator> IntoIterator for &'a mut Array<T, A> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
