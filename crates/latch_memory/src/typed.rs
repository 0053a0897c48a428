//! Typed construction on top of raw allocator blocks.
//!
//! `construct_array` returns an [`ArrayBlock`] descriptor that records the
//! element count and element size next to the data pointer. `destruct_array`
//! reads both back, drops every element in reverse index order, zeroes the
//! element size and hands the block back, so a second destruction of the
//! same descriptor is caught.

use crate::allocator::{MemoryAllocator, MemoryBlock};
use crate::error::AllocError;
use bytemuck::Zeroable;
use std::fmt;
use std::mem::{align_of, size_of};
use std::ops::{Deref, DerefMut};
use std::panic::Location;
use std::ptr::{self, NonNull};

/// Descriptor for an array built by [`construct_array`].
pub struct ArrayBlock<T> {
    data: NonNull<T>,
    count: usize,
    element_size: usize,
    block: Option<MemoryBlock>,
}

impl<T> ArrayBlock<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of one element as recorded at construction; zero once destructed.
    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    // Zero-sized types record an element size of 0 too, so the block is the
    // liveness marker.
    #[inline]
    pub fn is_destructed(&self) -> bool {
        self.block.is_none()
    }

    pub fn as_slice(&self) -> &[T] {
        assert!(!self.is_destructed(), "array accessed after destruction");
        // SAFETY: all `count` elements were constructed and are still alive.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.count) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        assert!(!self.is_destructed(), "array accessed after destruction");
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.count) }
    }
}

impl<T: fmt::Debug> fmt::Debug for ArrayBlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_destructed() {
            return f.write_str("ArrayBlock(destructed)");
        }
        f.debug_list().entries(self.as_slice()).finish()
    }
}

fn array_bytes<T>(count: usize) -> Result<usize, AllocError> {
    size_of::<T>()
        .checked_mul(count)
        .ok_or(AllocError::InvalidLayout {
            size: usize::MAX,
            alignment: align_of::<T>(),
        })
}

/// Allocate `count` elements and build each with `init(index)`.
pub fn construct_array_with<T, A, F>(
    count: usize,
    allocator: &A,
    location: &'static Location<'static>,
    mut init: F,
) -> Result<ArrayBlock<T>, AllocError>
where
    A: MemoryAllocator + ?Sized,
    F: FnMut(usize) -> T,
{
    let bytes = array_bytes::<T>(count)?;
    let block = allocator.allocate(bytes, align_of::<T>(), location)?;
    let data = block.cast::<T>();

    for index in 0..count {
        // SAFETY: index < count and the block holds `count` slots of T.
        unsafe { data.as_ptr().add(index).write(init(index)) };
    }

    Ok(ArrayBlock {
        data,
        count,
        element_size: size_of::<T>(),
        block: Some(block),
    })
}

/// Allocate `count` default-constructed elements.
#[track_caller]
pub fn construct_array<T, A>(count: usize, allocator: &A) -> Result<ArrayBlock<T>, AllocError>
where
    T: Default,
    A: MemoryAllocator + ?Sized,
{
    construct_array_with(count, allocator, Location::caller(), |_| T::default())
}

/// Allocate `count` elements by zero-filling the raw bytes.
///
/// Restricted to types for which all-zero bytes are a valid value.
#[track_caller]
pub fn construct_zeroed_array<T, A>(
    count: usize,
    allocator: &A,
) -> Result<ArrayBlock<T>, AllocError>
where
    T: Zeroable,
    A: MemoryAllocator + ?Sized,
{
    let bytes = array_bytes::<T>(count)?;
    let block = allocator.allocate(bytes, align_of::<T>(), Location::caller())?;
    // SAFETY: the block spans `bytes` writable bytes.
    unsafe { ptr::write_bytes(block.as_ptr(), 0, bytes) };

    Ok(ArrayBlock {
        data: block.cast::<T>(),
        count,
        element_size: size_of::<T>(),
        block: Some(block),
    })
}

/// Drop every element in reverse index order and free the block.
///
/// Panics if `array` was already destructed.
///
/// # Safety
/// `allocator` must be the allocator passed to the matching `construct_*`.
pub unsafe fn destruct_array<T, A>(array: &mut ArrayBlock<T>, allocator: &A)
where
    A: MemoryAllocator + ?Sized,
{
    // If you hit this, the array is being destructed twice.
    assert!(!array.is_destructed(), "double destruction of constructed array");
    array.element_size = 0;

    let base = array.data.as_ptr();
    for index in (0..array.count).rev() {
        // SAFETY: each element is alive and is dropped exactly once.
        unsafe { ptr::drop_in_place(base.add(index)) };
    }

    // SAFETY: forwarded from the caller.
    unsafe { allocator.release(array.block.take()) };
}

/// A single value placed in allocator memory.
pub struct ObjectBlock<T> {
    data: NonNull<T>,
    block: MemoryBlock,
}

impl<T> Deref for ObjectBlock<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the value stays alive until `destruct` consumes the block.
        unsafe { self.data.as_ref() }
    }
}

impl<T> DerefMut for ObjectBlock<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { self.data.as_mut() }
    }
}

impl<T: fmt::Debug> fmt::Debug for ObjectBlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectBlock").field(&**self).finish()
    }
}

/// Move `value` into memory from `allocator`.
#[track_caller]
pub fn construct<T, A>(value: T, allocator: &A) -> Result<ObjectBlock<T>, AllocError>
where
    A: MemoryAllocator + ?Sized,
{
    let block = allocator.allocate(size_of::<T>(), align_of::<T>(), Location::caller())?;
    let data = block.cast::<T>();
    // SAFETY: the block is sized and aligned for one T.
    unsafe { data.as_ptr().write(value) };
    Ok(ObjectBlock { data, block })
}

/// Drop the value and free its block.
///
/// # Safety
/// `allocator` must be the allocator passed to [`construct`].
pub unsafe fn destruct<T, A>(object: ObjectBlock<T>, allocator: &A)
where
    A: MemoryAllocator + ?Sized,
{
    // SAFETY: the value is alive and consumed here.
    unsafe {
        ptr::drop_in_place(object.data.as_ptr());
        allocator.deallocate(object.block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::HeapAllocator;
    use crate::tracking::{DebugTrackingPolicy, SimpleTrackingPolicy, TrackingPolicy};
    use crate::zone::Zone;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Tracked {
        index: usize,
        log: Option<Rc<RefCell<Vec<usize>>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            if let Some(log) = &self.log {
                log.borrow_mut().push(self.index);
            }
        }
    }

    fn allocator() -> HeapAllocator<SimpleTrackingPolicy> {
        HeapAllocator::new(Rc::new(Zone::unbounded("typed")))
    }

    #[test]
    fn destructs_every_element_in_reverse_order() {
        let allocator = allocator();
        let log = Rc::new(RefCell::new(Vec::new()));

        for count in [1, 2, 5, 33] {
            log.borrow_mut().clear();
            let mut array = construct_array_with(count, &allocator, Location::caller(), |index| {
                Tracked {
                    index,
                    log: Some(Rc::clone(&log)),
                }
            })
            .unwrap();
            assert_eq!(array.len(), count);
            assert_eq!(array.element_size(), size_of::<Tracked>());

            unsafe { destruct_array(&mut array, &allocator) };
            let expected: Vec<usize> = (0..count).rev().collect();
            assert_eq!(*log.borrow(), expected);
            assert!(array.is_destructed());
        }
        assert!(allocator.zone().is_balanced());
    }

    #[test]
    #[should_panic(expected = "double destruction")]
    fn second_destruction_panics() {
        let allocator = allocator();
        let mut array = construct_array::<u32, _>(4, &allocator).unwrap();
        unsafe {
            destruct_array(&mut array, &allocator);
            destruct_array(&mut array, &allocator);
        }
    }

    #[test]
    fn default_and_zeroed_construction() {
        let allocator = HeapAllocator::<DebugTrackingPolicy>::new(Rc::new(Zone::unbounded("t")));

        let mut defaults = construct_array::<u64, _>(8, &allocator).unwrap();
        assert!(defaults.as_slice().iter().all(|&v| v == 0));
        defaults.as_mut_slice()[3] = 7;
        assert_eq!(defaults.as_slice()[3], 7);

        let mut zeroed = construct_zeroed_array::<[f32; 4], _>(16, &allocator).unwrap();
        assert!(zeroed.as_slice().iter().all(|v| *v == [0.0; 4]));

        unsafe {
            destruct_array(&mut defaults, &allocator);
            destruct_array(&mut zeroed, &allocator);
        }
        assert_eq!(allocator.policy().live_allocations(), Some(0));
    }

    #[test]
    fn zero_sized_elements_construct_and_destruct() {
        #[derive(Default)]
        struct Marker;

        let allocator = allocator();
        let mut markers = construct_array::<Marker, _>(4, &allocator).unwrap();
        assert_eq!(markers.len(), 4);
        assert_eq!(markers.element_size(), 0);
        assert!(!markers.is_destructed());
        assert_eq!(markers.as_slice().len(), 4);
        assert_eq!(allocator.zone().active_allocations(), 1);

        unsafe { destruct_array(&mut markers, &allocator) };
        assert!(markers.is_destructed());
        assert!(allocator.zone().is_balanced());
    }

    #[test]
    #[should_panic(expected = "double destruction")]
    fn second_destruction_of_zero_sized_array_panics() {
        let allocator = allocator();
        let mut units = construct_array::<(), _>(2, &allocator).unwrap();
        unsafe {
            destruct_array(&mut units, &allocator);
            destruct_array(&mut units, &allocator);
        }
    }

    #[test]
    fn budget_failure_surfaces_from_construct() {
        let allocator = HeapAllocator::<SimpleTrackingPolicy>::new(Rc::new(Zone::new("t", 16)));
        let err = construct_array::<u64, _>(4, &allocator).unwrap_err();
        assert!(err.is_budget_exceeded());
    }

    #[test]
    fn single_objects_round_trip() {
        let allocator = allocator();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut object = construct(
            Tracked {
                index: 9,
                log: Some(Rc::clone(&log)),
            },
            &allocator,
        )
        .unwrap();
        object.index = 10;
        assert_eq!(allocator.zone().active_allocations(), 1);

        unsafe { destruct(object, &allocator) };
        assert_eq!(*log.borrow(), vec![10]);
        assert!(allocator.zone().is_balanced());
    }
}
