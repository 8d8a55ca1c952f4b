//! Console logging setup.
//!
//! Initializes a single `tracing` console layer. The default level is
//! `info`; set `RUST_LOG` to override (e.g. `RUST_LOG=flowline=debug`).

use anyhow::{Context as _, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Initialize logging. Call once at startup.
pub fn init() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();

    Ok(())
}
