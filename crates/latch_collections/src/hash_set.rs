//! Open-addressing hash table keyed by `K` with a `V` payload per key.
//!
//! Linear probing over a table whose size only grows. Removal leaves a
//! tombstone so later probes keep walking; inserts reclaim the first
//! tombstone on their probe path. The table is rebuilt before an insert
//! whenever live entries plus tombstones exceed 70% of the slots: at
//! `table_size * growth_factor` when the live entries alone are over that
//! line, otherwise at the same size to purge tombstones.

use crate::raw::{allocation_failed, RawBuffer};
use latch_memory::{AllocError, MemoryAllocator};
use rustc_hash::FxBuildHasher;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::ops::Index;
use std::panic::Location;

pub const HASHSET_INITIAL_SIZE: usize = 16;
pub const HASHSET_GROWTH_FACTOR: usize = 2;

// 7/10 as a ratio so the threshold check stays in integers.
const LOAD_NUMERATOR: usize = 7;
const LOAD_DENOMINATOR: usize = 10;

#[derive(Clone)]
enum Slot<K, V> {
    Empty,
    Occupied { hash: u32, key: K, value: V },
    Tombstone,
}

/// First occupied slot at or after `start`.
fn find_first_occupied<K, V>(slots: &[Slot<K, V>], start: usize) -> Option<usize> {
    slots
        .iter()
        .skip(start)
        .position(|slot| matches!(slot, Slot::Occupied { .. }))
        .map(|offset| start + offset)
}

enum Entry {
    Occupied(usize),
    Vacant { index: usize, hash: u32 },
}

enum Probe {
    Found(usize),
    /// Free slot an insert may take (empty, or the first tombstone passed).
    Vacant(usize),
    Missing,
    Exhausted,
}

pub struct HashSet<K, V, A: MemoryAllocator, S = FxBuildHasher> {
    table: RawBuffer<Slot<K, V>>,
    used_items: usize,
    tombstones: usize,
    growth_factor: usize,
    hasher: S,
    allocator: A,
}

impl<K: Hash + Eq, V, A: MemoryAllocator> HashSet<K, V, A, FxBuildHasher> {
    #[track_caller]
    pub fn new(allocator: A) -> Self {
        Self::with_config(
            allocator,
            HASHSET_INITIAL_SIZE,
            HASHSET_GROWTH_FACTOR,
            FxBuildHasher,
        )
    }
}

impl<K: Hash + Eq, V, A: MemoryAllocator, S: BuildHasher> HashSet<K, V, A, S> {
    /// Table of `initial_size` slots, allocated immediately.
    ///
    /// Panics if `initial_size` is zero or `growth_factor` is below 2.
    #[track_caller]
    pub fn with_config(allocator: A, initial_size: usize, growth_factor: usize, hasher: S) -> Self {
        match Self::try_with_config(allocator, initial_size, growth_factor, hasher) {
            Ok(set) => set,
            Err(err) => allocation_failed("HashSet", err),
        }
    }

    #[track_caller]
    pub fn try_with_config(
        allocator: A,
        initial_size: usize,
        growth_factor: usize,
        hasher: S,
    ) -> Result<Self, AllocError> {
        assert!(initial_size > 0, "HashSet table size must be non-zero");
        assert!(growth_factor >= 2, "HashSet growth factor must be at least 2");

        let table = Self::allocate_table(&allocator, initial_size, Location::caller())?;
        Ok(Self {
            table,
            used_items: 0,
            tombstones: 0,
            growth_factor,
            hasher,
            allocator,
        })
    }

    fn allocate_table(
        allocator: &A,
        size: usize,
        location: &'static Location<'static>,
    ) -> Result<RawBuffer<Slot<K, V>>, AllocError> {
        let mut table = RawBuffer::with_capacity(allocator, size, location)?;
        for index in 0..size {
            // SAFETY: fresh block, every slot is written once.
            unsafe { table.write(index, Slot::Empty) };
        }
        Ok(table)
    }

    fn hash_key<Q>(&self, key: &Q) -> u32
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        (hash ^ (hash >> 32)) as u32
    }

    /// Probe from `hash % table_size`, at most one full cycle.
    fn find_bucket<Q>(&self, hash: u32, key: &Q, inserting: bool) -> Probe
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let slots = self.slots();
        let table_size = slots.len();
        let start = hash as usize % table_size;
        let mut reclaimable = None;

        for step in 0..table_size {
            let index = (start + step) % table_size;
            match &slots[index] {
                Slot::Empty => {
                    return match (inserting, reclaimable) {
                        (true, Some(tombstone)) => Probe::Vacant(tombstone),
                        (true, None) => Probe::Vacant(index),
                        (false, _) => Probe::Missing,
                    };
                }
                Slot::Occupied {
                    hash: stored,
                    key: candidate,
                    ..
                } => {
                    if *stored == hash && candidate.borrow() == key {
                        return Probe::Found(index);
                    }
                }
                Slot::Tombstone => {
                    if inserting && reclaimable.is_none() {
                        reclaimable = Some(index);
                    }
                }
            }
        }

        match (inserting, reclaimable) {
            (true, Some(tombstone)) => Probe::Vacant(tombstone),
            (true, None) => Probe::Exhausted,
            (false, _) => Probe::Missing,
        }
    }

    fn over_threshold(&self, occupied: usize) -> bool {
        occupied * LOAD_DENOMINATOR > self.table.capacity() * LOAD_NUMERATOR
    }

    /// Table size the next rebuild should use.
    fn rebuild_size(&self) -> usize {
        if self.over_threshold(self.used_items) {
            self.table.capacity() * self.growth_factor
        } else {
            self.table.capacity()
        }
    }

    /// Rebuild into a table of `new_size` slots.
    ///
    /// Only live entries move across; their stored hashes are reused and
    /// tombstones are dropped.
    #[track_caller]
    fn repopulate(&mut self, new_size: usize) -> Result<(), AllocError> {
        let old_size = self.table.capacity();
        let mut table = Self::allocate_table(&self.allocator, new_size, Location::caller())?;

        for index in 0..old_size {
            // SAFETY: each old slot is read exactly once; the old block is
            // released below without dropping anything.
            let slot = unsafe { self.table.read(index) };
            if let Slot::Occupied { hash, key, value } = slot {
                let mut target = hash as usize % new_size;
                // SAFETY: target < new_size and all new slots are initialized.
                while !matches!(unsafe { &*table.as_ptr().add(target) }, Slot::Empty) {
                    target = (target + 1) % new_size;
                }
                // SAFETY: the slot holds `Slot::Empty`, which has no payload to drop.
                unsafe { table.write(target, Slot::Occupied { hash, key, value }) };
            }
        }

        // SAFETY: every old slot was moved out above.
        unsafe { self.table.release(&self.allocator) };
        self.table = table;

        tracing::debug!(
            from = old_size,
            to = new_size,
            live = self.used_items,
            dropped_tombstones = self.tombstones,
            "hash set rehashed"
        );
        self.tombstones = 0;
        Ok(())
    }

    /// Rehash if due, then locate `key` or the slot it would take.
    #[track_caller]
    fn entry(&mut self, key: &K) -> Entry {
        if self.over_threshold(self.used_items + self.tombstones) {
            if let Err(err) = self.repopulate(self.rebuild_size()) {
                allocation_failed("HashSet", err);
            }
        }

        let hash = self.hash_key(key);
        match self.find_bucket(hash, key, true) {
            Probe::Found(index) => Entry::Occupied(index),
            Probe::Vacant(index) => Entry::Vacant { index, hash },
            Probe::Missing | Probe::Exhausted => {
                panic!("HashSet probe exhausted {} slots on insert", self.table.capacity())
            }
        }
    }

    fn occupy(&mut self, index: usize, hash: u32, key: K, value: V) {
        let slot = &mut self.slots_mut()[index];
        let reclaimed = matches!(slot, Slot::Tombstone);
        *slot = Slot::Occupied { hash, key, value };
        if reclaimed {
            self.tombstones -= 1;
        }
        self.used_items += 1;
    }

    fn value_at(&mut self, index: usize) -> &mut V {
        match &mut self.slots_mut()[index] {
            Slot::Occupied { value, .. } => value,
            _ => unreachable!("slot {index} is not occupied"),
        }
    }

    /// Insert or overwrite the value for `key`, returning the previous value.
    #[track_caller]
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.entry(&key) {
            Entry::Occupied(index) => Some(std::mem::replace(self.value_at(index), value)),
            Entry::Vacant { index, hash } => {
                self.occupy(index, hash, key, value);
                None
            }
        }
    }

    /// Value for `key`, inserting `value` first when the key is absent.
    #[track_caller]
    pub fn get_or_insert(&mut self, key: K, value: V) -> &mut V {
        self.get_or_insert_with(key, || value)
    }

    #[track_caller]
    pub fn get_or_insert_with<F>(&mut self, key: K, make_value: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let index = match self.entry(&key) {
            Entry::Occupied(index) => index,
            Entry::Vacant { index, hash } => {
                self.occupy(index, hash, key, make_value());
                index
            }
        };
        self.value_at(index)
    }

    fn position<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // Tombstones never end the walk; only an empty slot does.
        match self.find_bucket(self.hash_key(key), key, false) {
            Probe::Found(index) => Some(index),
            _ => None,
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.position(key)?;
        match &self.slots()[index] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.position(key)?;
        match &mut self.slots_mut()[index] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn has_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.position(key).is_some()
    }

    /// Remove `key`, leaving a tombstone in its slot.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.position(key)?;
        let slot = std::mem::replace(&mut self.slots_mut()[index], Slot::Tombstone);
        self.used_items -= 1;
        self.tombstones += 1;
        match slot {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl<K, V, A: MemoryAllocator, S> HashSet<K, V, A, S> {
    fn slots(&self) -> &[Slot<K, V>] {
        // SAFETY: every slot of the table is always initialized.
        unsafe { self.table.slice(self.table.capacity()) }
    }

    fn slots_mut(&mut self) -> &mut [Slot<K, V>] {
        // SAFETY: as above.
        unsafe { self.table.slice_mut(self.table.capacity()) }
    }

    /// Drop every entry and tombstone; the table keeps its size.
    pub fn clear(&mut self) {
        for slot in self.slots_mut() {
            *slot = Slot::Empty;
        }
        self.used_items = 0;
        self.tombstones = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.used_items
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.used_items
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used_items == 0
    }

    /// Number of slots in the table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    pub fn growth_factor(&self) -> usize {
        self.growth_factor
    }

    /// Live entries over table size.
    pub fn load_factor(&self) -> f32 {
        self.used_items as f32 / self.table.capacity() as f32
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots(),
            index: 0,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            slots: self.slots_mut().iter_mut(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }
}

/// Occupied entries in table order.
pub struct Iter<'a, K, V> {
    slots: &'a [Slot<K, V>],
    index: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = find_first_occupied(self.slots, self.index)?;
        self.index = index + 1;
        match &self.slots[index] {
            Slot::Occupied { key, value, .. } => Some((key, value)),
            _ => None,
        }
    }
}

pub struct IterMut<'a, K, V> {
    slots: std::slice::IterMut<'a, Slot<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.slots.find_map(|slot| match slot {
            Slot::Occupied { key, value, .. } => Some((&*key, value)),
            _ => None,
        })
    }
}

impl<'a, K, V, A: MemoryAllocator, S> IntoIterator for &'a HashSet<K, V, A, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, A: MemoryAllocator, S> Drop for HashSet<K, V, A, S> {
    fn drop(&mut self) {
        let size = self.table.capacity();
        // SAFETY: all slots are live; the block is released after dropping them.
        unsafe {
            self.table.drop_range(size);
            self.table.release(&self.allocator);
        }
    }
}

/// Panics when `key` is absent; use [`HashSet::get`] to test first.
impl<K, V, A, S, Q> Index<&Q> for HashSet<K, V, A, S>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    A: MemoryAllocator,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(value) => value,
            None => panic!("HashSet key not present"),
        }
    }
}

/// Deep copy preserving slot positions, tombstones included.
impl<K, V, A, S> Clone for HashSet<K, V, A, S>
where
    K: Clone,
    V: Clone,
    A: MemoryAllocator + Clone,
    S: Clone,
{
    #[track_caller]
    fn clone(&self) -> Self {
        let size = self.table.capacity();
        let mut table = match RawBuffer::with_capacity(&self.allocator, size, Location::caller()) {
            Ok(table) => table,
            Err(err) => allocation_failed("HashSet", err),
        };
        for (index, slot) in self.slots().iter().enumerate() {
            // SAFETY: fresh block, every slot is written once.
            unsafe { table.write(index, slot.clone()) };
        }

        Self {
            table,
            used_items: self.used_items,
            tombstones: self.tombstones,
            growth_factor: self.growth_factor,
            hasher: self.hasher.clone(),
            allocator: self.allocator.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, A: MemoryAllocator, S> fmt::Debug for HashSet<K, V, A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
