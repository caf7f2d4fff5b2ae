//! Alignment Configuration Module
//!
//! Provides pipeline configuration loaded from TOML files, replacing
//! hardcoded algorithm tunables with operator-editable values.
//!
//! ## Loading Order
//!
//! 1. `ILIAD_CONFIG` environment variable (path to TOML file)
//! 2. `iliad.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(AlignmentConfig::load());
//!
//! // Anywhere in the codebase:
//! let band = config::get().dtw.band_fraction;
//! ```
//!
//! Jobs snapshot the config at creation, so a reload never changes a job
//! mid-flight.

mod alignment;
pub mod defaults;

pub use alignment::*;

use std::sync::OnceLock;

/// Global alignment configuration, initialized once at startup.
static ALIGNMENT_CONFIG: OnceLock<AlignmentConfig> = OnceLock::new();

/// Initialize the global alignment configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: AlignmentConfig) {
    if ALIGNMENT_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global alignment configuration.
///
/// Panics if `init()` has not been called. A missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static AlignmentConfig {
    ALIGNMENT_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    ALIGNMENT_CONFIG.get().is_some()
}
