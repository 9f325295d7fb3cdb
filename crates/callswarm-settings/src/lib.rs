//! # callswarm-settings
//!
//! Configuration management with layered sources for the callswarm
//! orchestrator.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`CallswarmSettings::default()`]
//! 2. **User file** — `~/.callswarm/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `CALLSWARM_*` overrides (highest priority)
//!
//! The minimum-slot-time policy, the agent-count ceiling, and the
//! live-result deadline all live here so tests and deployments can vary
//! them without touching code.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::Arc;

use parking_lot::RwLock;

/// Global settings singleton.
///
/// Uses `RwLock<Option<Arc<CallswarmSettings>>>` instead of `OnceLock` so
/// [`init_settings`] can replace the cached value. Reads are cheap
/// (shared lock + `Arc::clone`); writes only happen at initialization.
static SETTINGS: RwLock<Option<Arc<CallswarmSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.callswarm/settings.json` with
/// env var overrides. On subsequent calls, returns the cached value. If
/// loading fails, returns compiled defaults.
///
/// Returns an `Arc` so callers can hold a consistent snapshot even if
/// another thread reloads settings concurrently.
pub fn get_settings() -> Arc<CallswarmSettings> {
    // Fast path: read lock
    {
        let guard = SETTINGS.read();
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }

    // Slow path: first access, take write lock
    let mut guard = SETTINGS.write();
    // Double-check after acquiring write lock (another thread may have initialized)
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            CallswarmSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
///
/// Replaces any previously cached settings. Useful for tests and server
/// startup where the settings path is known.
pub fn init_settings(settings: CallswarmSettings) {
    let mut guard = SETTINGS.write();
    *guard = Some(Arc::new(settings));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_get_returns_same_values() {
        let mut settings = CallswarmSettings::default();
        settings.swarm.max_agents = 4;
        init_settings(settings);
        let got = get_settings();
        assert_eq!(got.swarm.max_agents, 4);
    }

    #[test]
    fn get_returns_shared_snapshot() {
        init_settings(CallswarmSettings::default());
        let a = get_settings();
        let b = get_settings();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
