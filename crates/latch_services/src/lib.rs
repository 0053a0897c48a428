//! Latch Services Layer
//!
//! Settings loading and the wiring that turns settings into live engine
//! services (currently the memory context).

pub mod settings;

pub use settings::{HashSetSettings, MemorySettings, Settings, SettingsError, ZoneSettings};

use latch_memory::MemoryContext;

/// Validate `settings` and build the memory context they describe.
pub fn init_services(settings: &Settings) -> Result<MemoryContext, SettingsError> {
    settings.validate()?;
    let context = settings.memory.build_context();
    tracing::info!(
        global_zone = context.global_zone().name(),
        system_zone = context.system_zone().name(),
        "services initialized"
    );
    Ok(context)
}
