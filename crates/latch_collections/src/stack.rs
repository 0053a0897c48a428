//! Growable LIFO stack.
//!
//! Storage is allocated on the first push ([`STACK_DEFAULT_CAPACITY`] slots)
//! and doubles when full. `clear(false)` keeps the buffer for reuse.

use crate::raw::{allocation_failed, RawBuffer};
use latch_memory::{AllocError, MemoryAllocator};
use std::fmt;
use std::panic::Location;

pub const STACK_DEFAULT_CAPACITY: usize = 16;

pub struct Stack<T, A: MemoryAllocator> {
    buffer: RawBuffer<T>,
    len: usize,
    allocator: A,
}

impl<T, A: MemoryAllocator> Stack<T, A> {
    pub fn new(allocator: A) -> Self {
        Self {
            buffer: RawBuffer::new(),
            len: 0,
            allocator,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    #[track_caller]
    fn grow(&mut self) -> Result<(), AllocError> {
        let capacity = match self.buffer.capacity() {
            0 => STACK_DEFAULT_CAPACITY,
            capacity => capacity * 2,
        };

        let mut expanded = RawBuffer::with_capacity(&self.allocator, capacity, Location::caller())?;
        // SAFETY: 0..len move to the new buffer before the old one is freed.
        unsafe {
            self.buffer.move_into(&mut expanded, self.len);
            self.buffer.release(&self.allocator);
        }
        tracing::debug!(capacity, len = self.len, "stack grew");
        self.buffer = expanded;
        Ok(())
    }

    #[track_caller]
    pub fn try_push(&mut self, value: T) -> Result<(), AllocError> {
        if self.len >= self.buffer.capacity() {
            self.grow()?;
        }
        // SAFETY: len < capacity and the slot is free.
        unsafe { self.buffer.write(self.len, value) };
        self.len += 1;
        Ok(())
    }

    #[track_caller]
    pub fn push(&mut self, value: T) {
        if let Err(err) = self.try_push(value) {
            allocation_failed("Stack", err);
        }
    }

    /// Remove and return the top value. Panics when empty.
    pub fn pop(&mut self) -> T {
        assert!(self.len > 0, "pop on an empty Stack");
        self.len -= 1;
        // SAFETY: the slot was live and is no longer counted.
        unsafe { self.buffer.read(self.len) }
    }

    pub fn top(&self) -> &T {
        assert!(self.len > 0, "top of an empty Stack");
        &self.as_slice()[self.len - 1]
    }

    pub fn top_mut(&mut self) -> &mut T {
        assert!(self.len > 0, "top of an empty Stack");
        let top = self.len - 1;
        &mut self.as_mut_slice()[top]
    }

    /// Drop every value; with `purge` the buffer is freed as well.
    pub fn clear(&mut self, purge: bool) {
        let len = std::mem::replace(&mut self.len, 0);
        // SAFETY: 0..len were live; the buffer holds nothing afterwards.
        unsafe {
            self.buffer.drop_range(len);
            if purge {
                self.buffer.release(&self.allocator);
            }
        }
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

    /// Bottom to top.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: 0..len are live.
        unsafe { self.buffer.slice(self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: 0..len are live.
        unsafe { self.buffer.slice_mut(self.len) }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T, A: MemoryAllocator> Drop for Stack<T, A> {
    fn drop(&mut self) {
        self.clear(true);
    }
}

impl<T: Clone, A: MemoryAllocator + Clone> Clone for Stack<T, A> {
    #[track_caller]
    fn clone(&self) -> Self {
        let mut copy = Self::new(self.allocator.clone());
        if self.buffer.is_allocated() {
            copy.buffer =
                match RawBuffer::with_capacity(&copy.allocator, self.capacity(), Location::caller()) {
                    Ok(buffer) => buffer,
                    Err(err) => allocation_failed("Stack", err),
                };
        }
        for value in self.iter() {
            copy.push(value.clone());
        }
        copy
    }
}

impl<T: fmt::Debug, A: MemoryAllocator> fmt::Debug for Stack<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latch_memory::{DebugTrackingPolicy, HeapAllocator, Zone};
    use std::rc::Rc;

    fn allocator() -> HeapAllocator<DebugTrackingPolicy> {
        HeapAllocator::new(Rc::new(Zone::unbounded("stack")))
    }

    #[test]
    fn pops_in_reverse_push_order() {
        let allocator = allocator();
        let mut stack = Stack::new(&allocator);
        stack.push('a');
        stack.push('b');
        stack.push('c');

        assert_eq!(stack.pop(), 'c');
        assert!(!stack.is_empty());
        assert_eq!(stack.pop(), 'b');
        assert!(!stack.is_empty());
        assert_eq!(stack.pop(), 'a');
        assert!(stack.is_empty());
    }

    #[test]
    fn allocates_lazily_and_doubles() {
        let allocator = allocator();
        let mut stack = Stack::new(&allocator);
        assert_eq!(stack.capacity(), 0);
        assert_eq!(allocator.zone().total_allocations(), 0);

        stack.push(0u32);
        assert_eq!(stack.capacity(), STACK_DEFAULT_CAPACITY);
        for value in 1..=16 {
            stack.push(value);
        }
        assert_eq!(stack.capacity(), 32);
        assert_eq!(*stack.top(), 16);
        assert_eq!(stack.size(), 17);
        assert_eq!(allocator.zone().total_allocations(), 2);
    }

    #[test]
    fn top_mut_edits_in_place() {
        let allocator = allocator();
        let mut stack = Stack::new(&allocator);
        stack.push(String::from("frame"));
        stack.top_mut().push_str("-1");
        assert_eq!(stack.top(), "frame-1");
    }

    #[test]
    fn clear_without_purge_keeps_buffer() {
        let allocator = allocator();
        let shared = Rc::new(());
        let mut stack = Stack::new(&allocator);
        for _ in 0..5 {
            stack.push(Rc::clone(&shared));
        }

        stack.clear(false);
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), STACK_DEFAULT_CAPACITY);
        assert_eq!(Rc::strong_count(&shared), 1);
        assert_eq!(allocator.zone().active_allocations(), 1);

        stack.push(Rc::clone(&shared));
        stack.clear(true);
        assert_eq!(stack.capacity(), 0);
        assert!(allocator.zone().is_balanced());
    }

    #[test]
    fn clone_is_deep() {
        let allocator = allocator();
        let mut original = Stack::new(&allocator);
        original.push(vec![1]);
        let mut copy = original.clone();
        copy.top_mut().push(2);
        assert_eq!(original.top(), &vec![1]);
        assert_eq!(copy.top(), &vec![1, 2]);
        assert_eq!(copy.capacity(), original.capacity());
        assert_eq!(allocator.zone().active_allocations(), 2);
    }

    #[test]
    #[should_panic(expected = "empty Stack")]
    fn pop_on_empty_panics() {
        let allocator = allocator();
        let mut stack: Stack<u8, _> = Stack::new(&allocator);
        stack.pop();
    }

    #[test]
    #[should_panic(expected = "empty Stack")]
    fn top_on_empty_panics() {
        let allocator = allocator();
        let stack: Stack<u8, _> = Stack::new(&allocator);
        stack.top();
    }
}
