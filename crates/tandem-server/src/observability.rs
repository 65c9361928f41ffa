//! Tracing setup for the session server.
//!
//! The subscriber starts with a default filter so startup messages are
//! visible, and the level from `[logging]` is swapped in once the
//! configuration has been loaded. `RUST_LOG` overrides both.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

const STARTUP_LEVEL: &str = "info";

/// Builds the filter for a configured level. A bare level also enables
/// `tower_http` request traces at `debug`; full directives are used as given.
fn filter_for(level: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    let level = level.trim();
    if level.contains('=') {
        return EnvFilter::try_new(level);
    }
    EnvFilter::try_new(format!("{level},tower_http=debug"))
}

/// Installs the global subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| filter_for(STARTUP_LEVEL))
        .unwrap_or_else(|_| EnvFilter::new(STARTUP_LEVEL));

    let (filter_layer, handle) = reload::Layer::new(filter);
    if FILTER_HANDLE.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Switches to the configured level unless `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::debug!(configured = level, "RUST_LOG set, keeping its filter");
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    match filter_for(level) {
        Ok(filter) => {
            if let Err(e) = handle.reload(filter) {
                tracing::warn!(error = %e, "failed to apply logging level");
            }
        }
        Err(e) => {
            tracing::warn!(level, error = %e, "invalid logging level, keeping current filter");
        }
    }
}
