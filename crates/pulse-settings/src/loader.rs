//! Layered settings loading.
//!
//! The user file is merged key by key over the serialized defaults. Nested
//! objects merge recursively, arrays (such as `services`) are replaced
//! whole, and `null` in the file leaves the default in place.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{PulseSettings, ServiceSettings};

/// Resolve the path to the settings file (`~/.pulse/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pulse").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PulseSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PulseSettings> {
    let defaults = serde_json::to_value(PulseSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PulseSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Merge `overlay` onto `base`, recursing into objects.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Parse `name=url,name=url` into service entries.
pub fn parse_services(list: &str) -> Result<Vec<ServiceSettings>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, address) = entry.split_once('=').ok_or_else(|| {
                SettingsError::InvalidValue(format!("expected name=url, got {entry}"))
            })?;
            Ok(ServiceSettings::new(name.trim(), address.trim()))
        })
        .collect()
}

/// Apply `PULSE_*` environment variable overrides. Unparseable or
/// out-of-range values are logged and skipped.
pub fn apply_env_overrides(settings: &mut PulseSettings) {
    if let Some(services) = read_env("PULSE_SERVICES", |v| {
        parse_services(v).ok().filter(|s| !s.is_empty())
    }) {
        settings.services = services;
    }
    if let Some(v) = read_env("PULSE_CAPACITY", |v| parse_in_range(v, 1usize, 100_000)) {
        settings.tracker.capacity = v;
    }
    if let Some(v) = read_env("PULSE_CONNECT_TIMEOUT_MS", |v| parse_in_range(v, 100u64, 600_000)) {
        settings.connection.connect_timeout_ms = v;
    }
    if let Some(v) = read_env("PULSE_HEARTBEAT_INTERVAL_MS", |v| {
        parse_in_range(v, 1_000u64, 600_000)
    }) {
        settings.connection.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env("PULSE_MAX_ATTEMPTS", |v| parse_in_range(v, 0u32, 1_000)) {
        settings.reconnect.max_attempts = v;
    }
    if let Some(v) = read_env("PULSE_STATUS_PORT", |v| v.parse::<u16>().ok()) {
        settings.server.port = v;
    }
    if let Some(v) = read_env("PULSE_LOG_LEVEL", |v| Some(v.to_string())) {
        settings.logging.level = v;
    }
    if let Some(v) = read_env("PULSE_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and keep it only if it lies in `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim()
        .parse::<T>()
        .ok()
        .filter(|n| *n >= min && *n <= max)
}

/// Read a non-empty env var through `parse`, warning when it is rejected.
fn read_env<T>(key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(key).ok().filter(|v| !v.is_empty())?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring invalid env override");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"connection": {"connectTimeoutMs": 5000, "heartbeatIntervalMs": 30000}});
        let source = serde_json::json!({"connection": {"connectTimeoutMs": 2000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["connection"]["connectTimeoutMs"], 2000);
        assert_eq!(merged["connection"]["heartbeatIntervalMs"], 30000);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"services": [{"name": "a"}, {"name": "b"}]});
        let source = serde_json::json!({"services": [{"name": "c"}]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["services"], serde_json::json!([{"name": "c"}]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.tracker.capacity, PulseSettings::default().tracker.capacity);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"tracker": {"capacity": 20}, "reconnect": {"maxAttempts": 2},
                "services": [{"name": "claude", "address": "ws://10.0.0.5:3210/ws/realtime"}]}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.tracker.capacity, 20);
        assert_eq!(settings.reconnect.max_attempts, 2);
        assert_eq!(settings.reconnect.fast_attempts, 3);
        assert_eq!(settings.services.len(), 1);
        assert_eq!(settings.services[0].address, "ws://10.0.0.5:3210/ws/realtime");
        assert_eq!(settings.connection.connect_timeout_ms, 5_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"tracker": {"capacity": "lots"}}"#).unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_services_list() {
        let services =
            parse_services("claude=ws://127.0.0.1:3210/ws/realtime, codex = ws://127.0.0.1:3211/ws/realtime,")
                .unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[1].name, "codex");
        assert_eq!(services[1].address, "ws://127.0.0.1:3211/ws/realtime");
    }

    #[test]
    fn parse_services_rejects_missing_separator() {
        assert!(parse_services("claude").is_err());
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool(" 1 "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_in_range("3390", 0u16, u16::MAX), Some(3390));
        assert_eq!(parse_in_range::<u16>("70000", 0, u16::MAX), None);
        assert_eq!(parse_in_range("50", 100u64, 1000), None);
        assert_eq!(parse_in_range(" 20 ", 1usize, 100), Some(20));
        assert_eq!(parse_in_range("x", 1usize, 100), None);
    }
}
