//! Latch Engine Runtime
//!
//! Process-entry layer. Owns the default memory context for the main thread
//! between [`startup`] and [`shutdown`]; everything below this crate takes
//! its allocator as a parameter.

use latch_collections::{Array, CircularBuffer, FixedArray, FxBuildHasher, HashSet, Stack};
use latch_memory::{
    construct, construct_array, destruct, destruct_array, AllocError, GlobalAllocatorType,
    MemoryContext, SystemAllocatorType,
};
use latch_services::{HashSetSettings, Settings, SettingsError};
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static CONTEXT: RefCell<Option<MemoryContext>> = const { RefCell::new(None) };
}

/// Build the default memory context. Must be called once before any use.
pub fn startup(settings: &Settings) -> Result<(), SettingsError> {
    assert!(!is_started(), "memory startup called twice");
    let context = latch_services::init_services(settings)?;
    CONTEXT.with(|slot| *slot.borrow_mut() = Some(context));
    tracing::info!("runtime memory started");
    Ok(())
}

/// Tear down the default context; its zones report and check for leaks.
///
/// Panics without a prior [`startup`], or while an allocator handle obtained
/// from [`global_allocator`] / [`system_allocator`] is still alive.
pub fn shutdown() {
    let context = CONTEXT.with(|slot| slot.borrow_mut().take());
    let Some(context) = context else {
        panic!("memory shutdown called without startup");
    };
    context.shutdown();
    tracing::info!("runtime memory shut down");
}

pub fn is_started() -> bool {
    CONTEXT.with(|slot| slot.borrow().is_some())
}

/// Run `f` against the default context.
pub fn with_context<R>(f: impl FnOnce(&MemoryContext) -> R) -> R {
    CONTEXT.with(|slot| {
        let context = slot.borrow();
        match context.as_ref() {
            Some(context) => f(context),
            None => panic!("memory context used before startup"),
        }
    })
}

pub fn global_allocator() -> Rc<GlobalAllocatorType> {
    with_context(|context| Rc::clone(context.allocator()))
}

pub fn system_allocator() -> Rc<SystemAllocatorType> {
    with_context(|context| Rc::clone(context.system_allocator()))
}

/// What [`run_demo`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSummary {
    pub frame_samples: usize,
    pub array_capacity: usize,
    pub vertex_count: usize,
    pub scratch_slots: usize,
    pub asset_count: usize,
    pub asset_table_size: usize,
    pub deepest_scope: usize,
    pub zone_allocations: usize,
}

/// Exercise every container against the default allocators.
///
/// Everything built here is released before returning, on error too.
/// Budget rejections from the fixed-size allocations come back as
/// [`AllocError`].
pub fn run_demo(hash_set: &HashSetSettings) -> Result<DemoSummary, AllocError> {
    let allocator = global_allocator();
    let system = system_allocator();

    let mut frame_times = Array::new(&*allocator);
    for frame in 0..40u32 {
        frame_times.push_back(16.0 + (frame % 3) as f32);
    }
    let average = frame_times.iter().sum::<f32>() / frame_times.len() as f32;
    tracing::info!(frames = frame_times.len(), average, "frame times collected");

    let mut vertices = FixedArray::new(&*system);
    vertices.allocate(24, [0.0f32; 3])?;

    let mut scratch: CircularBuffer<String, _, 4> = CircularBuffer::new(&*allocator);
    for message in ["load", "bind", "draw", "present", "load"] {
        let slot = scratch.next();
        slot.clear();
        slot.push_str(message);
    }

    let mut assets: HashSet<String, u32, _> = HashSet::with_config(
        &*allocator,
        hash_set.initial_size,
        hash_set.growth_factor,
        FxBuildHasher,
    );
    for id in 0..24u32 {
        assets.insert(format!("textures/tile_{id:02}.png"), id);
    }
    assets.remove("textures/tile_00.png");
    *assets.get_or_insert(String::from("textures/missing.png"), 0) += 1;

    let mut scopes = Stack::new(&*allocator);
    let mut deepest_scope = 0;
    for depth in 0..20usize {
        scopes.push(depth);
        deepest_scope = deepest_scope.max(scopes.len());
    }
    while !scopes.is_empty() {
        scopes.pop();
    }

    let mut indices = construct_array::<u16, _>(6, &*allocator)?;
    indices.as_mut_slice().copy_from_slice(&[0, 1, 2, 2, 1, 3]);
    let camera = match construct([0.0f32; 16], &*allocator) {
        Ok(camera) => camera,
        Err(err) => {
            // SAFETY: built from `allocator` just above.
            unsafe { destruct_array(&mut indices, &*allocator) };
            return Err(err);
        }
    };

    let summary = DemoSummary {
        frame_samples: frame_times.len(),
        array_capacity: frame_times.capacity(),
        vertex_count: vertices.len(),
        scratch_slots: scratch.size(),
        asset_count: assets.len(),
        asset_table_size: assets.capacity(),
        deepest_scope,
        zone_allocations: allocator.zone_handle().total_allocations(),
    };

    // SAFETY: both came from `allocator` above.
    unsafe {
        destruct(camera, &*allocator);
        destruct_array(&mut indices, &*allocator);
    }

    tracing::info!(?summary, "demo finished");
    Ok(summary)
}
