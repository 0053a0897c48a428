//! Exact-size array allocated once and never grown.

use crate::raw::allocation_failed;
use bytemuck::Zeroable;
use latch_memory::{
    construct_array_with, construct_zeroed_array, destruct_array, AllocError, ArrayBlock,
    MemoryAllocator,
};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::panic::Location;

pub struct FixedArray<T, A: MemoryAllocator> {
    block: Option<ArrayBlock<T>>,
    allocator: A,
}

impl<T, A: MemoryAllocator> FixedArray<T, A> {
    /// Unallocated array of length zero.
    pub fn new(allocator: A) -> Self {
        Self {
            block: None,
            allocator,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Replace the contents with `count` elements built by `init(index)`.
    ///
    /// Any previous contents are destroyed first.
    #[track_caller]
    pub fn allocate_with<F>(&mut self, count: usize, init: F) -> Result<(), AllocError>
    where
        F: FnMut(usize) -> T,
    {
        self.clear();
        let block = construct_array_with(count, &self.allocator, Location::caller(), init)?;
        self.block = Some(block);
        Ok(())
    }

    /// Replace the contents with `count` clones of `value`.
    #[track_caller]
    pub fn allocate(&mut self, count: usize, value: T) -> Result<(), AllocError>
    where
        T: Clone,
    {
        self.allocate_with(count, |_| value.clone())
    }

    /// Replace the contents with `count` all-zero elements.
    #[track_caller]
    pub fn allocate_zeroed(&mut self, count: usize) -> Result<(), AllocError>
    where
        T: Zeroable,
    {
        self.clear();
        let block = construct_zeroed_array(count, &self.allocator)?;
        self.block = Some(block);
        Ok(())
    }

    /// Destroy every element and free the block. Calling it again is a no-op.
    pub fn clear(&mut self) {
        if let Some(mut block) = self.block.take() {
            // SAFETY: the block came from this allocator.
            unsafe { destruct_array(&mut block, &self.allocator) };
        }
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.block.is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.block.as_ref().map_or(0, ArrayBlock::len)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.block {
            Some(block) => block.as_slice(),
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &mut self.block {
            Some(block) => block.as_mut_slice(),
            None => &mut [],
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }
}

impl<T, A: MemoryAllocator> Drop for FixedArray<T, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, A: MemoryAllocator> Index<usize> for FixedArray<T, A> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        let len = self.len();
        assert!(index < len, "FixedArray index {index} out of bounds (len {len})");
        &self.as_slice()[index]
    }
}

impl<T, A: MemoryAllocator> IndexMut<usize> for FixedArray<T, A> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        let len = self.len();
        assert!(index < len, "FixedArray index {index} out of bounds (len {len})");
        &mut self.as_mut_slice()[index]
    }
}

/// Deep copy through each element's `Clone`.
impl<T: Clone, A: MemoryAllocator + Clone> Clone for FixedArray<T, A> {
    #[track_caller]
    fn clone(&self) -> Self {
        let mut copy = Self::new(self.allocator.clone());
        if self.is_allocated() {
            let source = self.as_slice();
            if let Err(err) = copy.allocate_with(source.len(), |index| source[index].clone()) {
                allocation_failed("FixedArray", err);
            }
        }
        copy
    }
}

impl<T: fmt::Debug, A: MemoryAllocator> fmt::Debug for FixedArray<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T, A: MemoryAllocator> IntoIterator for &'a FixedArray<T, A> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
