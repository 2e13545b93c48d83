//! Log setup. The filter sits behind a reload layer so the level from the
//! config file can be applied after the subscriber is already installed.
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();
static RUST_LOG_SET: OnceLock<bool> = OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    let from_env = std::env::var_os("RUST_LOG")
        .and_then(|_| EnvFilter::try_from_default_env().ok());
    let _ = RUST_LOG_SET.set(from_env.is_some());

    let (filter, handle) = reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new(level)));
    let _ = FILTER.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// Switches to the configured level. `RUST_LOG` always wins.
pub fn apply_logging_level(level: &str) {
    if RUST_LOG_SET.get().copied().unwrap_or(false) {
        return;
    }
    if let Some(handle) = FILTER.get() {
        if let Err(err) = handle.reload(EnvFilter::new(level)) {
            tracing::warn!(%err, "could not change log level");
        }
    }
}
