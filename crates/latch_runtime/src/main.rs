//! Latch Engine Runtime
//!
//! Boots the memory subsystem, runs the container demo and shuts down.
//! Usage: `latch [settings.json]`

use anyhow::{Context, Result};
use latch_services::Settings;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Latch Engine v{}", latch_memory::VERSION);

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(&path).with_context(|| format!("loading settings from {path}"))?,
        None => Settings::default(),
    };

    tracing::info!("Initializing services...");
    latch_runtime::startup(&settings).context("memory startup failed")?;

    let summary =
        latch_runtime::run_demo(&settings.memory.hash_set).context("container demo failed")?;
    tracing::info!(
        allocations = summary.zone_allocations,
        assets = summary.asset_count,
        "demo complete"
    );

    latch_runtime::shutdown();
    Ok(())
}
