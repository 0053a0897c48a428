//! Latch Engine Collections
//!
//! Containers that allocate through a [`latch_memory::MemoryAllocator`]:
//! - `Array`: growable, doubling array
//! - `FixedArray`: exact-size array allocated once
//! - `CircularBuffer`: ring of scratch slots over a `FixedArray`
//! - `HashSet`: open-addressing table with tombstones
//! - `Stack`: growable LIFO
//!
//! Growth failures in the panicking entry points are fatal; the `try_*`
//! variants and `FixedArray::allocate*` report [`latch_memory::AllocError`]
//! instead. Every container deep-copies on `Clone`.

pub mod array;
pub mod circular_buffer;
pub mod fixed_array;
pub mod hash_set;
pub mod stack;

mod raw;

pub use array::{Array, ARRAY_DEFAULT_CAPACITY};
pub use circular_buffer::CircularBuffer;
pub use fixed_array::FixedArray;
pub use hash_set::{HashSet, HASHSET_GROWTH_FACTOR, HASHSET_INITIAL_SIZE};
pub use stack::{Stack, STACK_DEFAULT_CAPACITY};

pub use rustc_hash::FxBuildHasher;
