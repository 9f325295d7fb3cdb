//! Settings loading: defaults → file → environment overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::CallswarmSettings;

/// Path of the user settings file (`~/.callswarm/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".callswarm").join("settings.json")
}

/// Load settings from the default path with env overrides applied.
///
/// A missing file is not an error — defaults are used. A present but
/// unreadable/unparseable file is an error (a deliberate config should
/// never be silently ignored).
pub fn load_settings() -> Result<CallswarmSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path, deep-merging over defaults, then
/// apply `CALLSWARM_*` environment overrides and validate.
pub fn load_settings_from_path(path: &Path) -> Result<CallswarmSettings> {
    let mut merged = serde_json::to_value(CallswarmSettings::default())
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_value: Value =
            serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(&mut merged, file_value);
        tracing::debug!(?path, "settings file merged");
    }

    let mut settings: CallswarmSettings = serde_json::from_value(merged).map_err(|source| {
        SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursively merge `overlay` into `base`. Objects merge key-by-key;
/// any other value replaces.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        let _ = base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// Apply `CALLSWARM_*` environment variable overrides (highest priority).
fn apply_env_overrides(settings: &mut CallswarmSettings) {
    if let Ok(host) = std::env::var("CALLSWARM_HOST") {
        settings.server.host = host;
    }
    if let Ok(port) = std::env::var("CALLSWARM_PORT") {
        match port.parse() {
            Ok(p) => settings.server.port = p,
            Err(_) => tracing::warn!(value = %port, "ignoring unparseable CALLSWARM_PORT"),
        }
    }
    if let Ok(secret) = std::env::var("CALLSWARM_WEBHOOK_SECRET") {
        if !secret.is_empty() {
            settings.server.webhook_secret = Some(secret);
        }
    }
    if let Ok(min_time) = std::env::var("CALLSWARM_MIN_SLOT_TIME") {
        settings.swarm.min_slot_time = min_time;
    }
    if let Ok(max) = std::env::var("CALLSWARM_MAX_AGENTS") {
        match max.parse() {
            Ok(m) => settings.swarm.max_agents = m,
            Err(_) => tracing::warn!(value = %max, "ignoring unparseable CALLSWARM_MAX_AGENTS"),
        }
    }
    if let Ok(demo) = std::env::var("CALLSWARM_DEMO_MODE") {
        settings.swarm.demo_mode = demo.eq_ignore_ascii_case("true") || demo == "1";
    }
    if let Ok(timeout) = std::env::var("CALLSWARM_LIVE_TIMEOUT_SECS") {
        match timeout.parse() {
            Ok(t) => settings.swarm.live_result_timeout_secs = t,
            Err(_) => {
                tracing::warn!(value = %timeout, "ignoring unparseable CALLSWARM_LIVE_TIMEOUT_SECS");
            }
        }
    }
    if let Ok(dir) = std::env::var("CALLSWARM_DIRECTORY") {
        settings.directory.path = Some(PathBuf::from(dir));
    }
    if let Ok(sim) = std::env::var("CALLSWARM_SIMULATION") {
        settings.directory.simulation_path = Some(PathBuf::from(sim));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.swarm.min_slot_time, "9:30 AM");
        assert_eq!(settings.server.port, 8000);
    }

    #[test]
    fn file_overrides_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_settings(
            &dir,
            r#"{"swarm": {"minSlotTime": "10:00 AM"}, "server": {"port": 9100}}"#,
        );
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.swarm.min_slot_time, "10:00 AM");
        assert_eq!(settings.server.port, 9100);
        // Untouched fields keep defaults
        assert_eq!(settings.swarm.max_agents, 15);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_settings(&dir, "{not json");
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn validation_runs_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_settings(&dir, r#"{"swarm": {"maxAgents": 99}}"#);
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.swarm.max_agents, 15);
    }

    #[test]
    fn deep_merge_nested_objects() {
        let mut base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        deep_merge(&mut base, serde_json::json!({"a": {"y": 9}}));
        assert_eq!(base, serde_json::json!({"a": {"x": 1, "y": 9}, "b": 3}));
    }

    #[test]
    fn deep_merge_scalar_replaces() {
        let mut base = serde_json::json!({"a": {"x": 1}});
        deep_merge(&mut base, serde_json::json!({"a": 5}));
        assert_eq!(base, serde_json::json!({"a": 5}));
    }

    #[test]
    fn deep_merge_adds_new_keys() {
        let mut base = serde_json::json!({"a": 1});
        deep_merge(&mut base, serde_json::json!({"b": {"c": 2}}));
        assert_eq!(base, serde_json::json!({"a": 1, "b": {"c": 2}}));
    }
}
