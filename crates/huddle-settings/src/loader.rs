//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HuddleSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `HUDDLE_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::HuddleSettings;

/// Resolve the default settings file path (`~/.huddle/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".huddle").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HuddleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HuddleSettings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file(path: &Path) -> Result<HuddleSettings> {
    let defaults = serde_json::to_value(HuddleSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `HUDDLE_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut HuddleSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from any key lookup. Invalid values are ignored with a
/// warning and leave the file/default value in place.
pub fn apply_overrides<F>(settings: &mut HuddleSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("HUDDLE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = parsed(&read, "HUDDLE_PORT", |v| parse_u16_range(v, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = parsed(&read, "HUDDLE_HEARTBEAT_INTERVAL_MS", |v| {
        parse_u64_range(v, 100, 600_000)
    }) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = parsed(&read, "HUDDLE_CHANNEL_CAPACITY", |v| {
        parse_usize_range(v, 1, 65_536)
    }) {
        settings.server.channel_capacity = v;
    }
    if let Some(v) = parsed(&read, "HUDDLE_MAX_CONNECTIONS", |v| {
        parse_usize_range(v, 1, 1_000_000)
    }) {
        settings.server.max_connections = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = read("HUDDLE_AUTH_TOKENS") {
        settings.auth.tokens = v
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = parsed(&read, "HUDDLE_RECONNECT_DELAY_MS", |v| {
        parse_u64_range(v, 1, 3_600_000)
    }) {
        settings.client.reconnect_delay_ms = v;
    }
    if let Some(v) = parsed(&read, "HUDDLE_REALTIME_ENABLED", parse_bool) {
        settings.client.enabled = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("HUDDLE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn parsed<T>(
    read: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = read(key)?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"tokens": ["a", "b"]});
        let source = serde_json::json!({"tokens": ["c"]});
        assert_eq!(deep_merge(target, source)["tokens"], serde_json::json!(["c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"heartbeatIntervalMs": 15000}, "auth": {"tokens": ["t1"]}}"#,
        )
        .unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.server.heartbeat_interval_ms, 15_000);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.auth.tokens, vec!["t1".to_string()]);
    }

    #[test]
    fn load_null_value_keeps_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"client": {"reconnectDelayMs": null}}"#).unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.client.reconnect_delay_ms, 5_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_file(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"channelCapacity": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = HuddleSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("HUDDLE_HOST", "127.0.0.1"),
                ("HUDDLE_PORT", "9100"),
                ("HUDDLE_HEARTBEAT_INTERVAL_MS", "1000"),
                ("HUDDLE_AUTH_TOKENS", "a, b,,c"),
                ("HUDDLE_RECONNECT_DELAY_MS", "1000"),
                ("HUDDLE_REALTIME_ENABLED", "off"),
                ("HUDDLE_LOG_LEVEL", "debug"),
            ]),
        );
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9100);
        assert_eq!(s.server.heartbeat_interval_ms, 1000);
        assert_eq!(s.auth.tokens, vec!["a", "b", "c"]);
        assert_eq!(s.client.reconnect_delay_ms, 1000);
        assert!(!s.client.enabled);
        assert_eq!(s.logging.level, "debug");
    }

    #[test]
    fn invalid_overrides_ignored() {
        let mut s = HuddleSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("HUDDLE_PORT", "0"),
                ("HUDDLE_HEARTBEAT_INTERVAL_MS", "abc"),
                ("HUDDLE_REALTIME_ENABLED", "maybe"),
            ]),
        );
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.heartbeat_interval_ms, 30_000);
        assert!(s.client.enabled);
    }

    #[test]
    fn empty_override_ignored() {
        let mut s = HuddleSettings::default();
        apply_overrides(&mut s, env(&[("HUDDLE_HOST", "")]));
        assert_eq!(s.server.host, "0.0.0.0");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE", "On"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "No"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_usize_range("50", 1, 10_000), Some(50));
        assert_eq!(parse_usize_range("x", 1, 10_000), None);
    }
}
