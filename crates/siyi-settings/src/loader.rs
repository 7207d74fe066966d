//! Settings loading: compiled defaults, then the user file, then the
//! environment.
//!
//! Merge rules for the file layer:
//! - objects merge per key
//! - arrays and primitives replace
//! - `null` is skipped, keeping the default

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::SiyiSettings;

/// `~/.siyi/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".siyi").join("settings.json")
}

/// Load from [`settings_path`] and apply `SIYI_*` overrides.
pub fn load_settings() -> Result<SiyiSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and apply `SIYI_*` overrides.
///
/// A missing file yields defaults. A malformed file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SiyiSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<SiyiSettings> {
    let defaults = serde_json::to_value(SiyiSettings::default())?;
    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let user: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursively merge `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut into), Value::Object(from)) => {
            for (key, value) in from {
                if value.is_null() {
                    continue;
                }
                let merged = match into.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = into.insert(key, merged);
            }
            Value::Object(into)
        }
        (_, source) => source,
    }
}

/// Apply `SIYI_*` variables from the process environment.
pub fn apply_env_overrides(settings: &mut SiyiSettings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and
/// ignored.
pub fn apply_overrides_from<F>(settings: &mut SiyiSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = read("SIYI_URL") {
        settings.client.url = v;
    }
    if let Some(v) = read("SIYI_AGENT_ID") {
        settings.client.agent_id = v;
    }
    if let Some(v) = read("SIYI_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("SIYI_PORT") {
        match parse_u16_range(&v, 0, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "SIYI_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("SIYI_HEARTBEAT_COMMAND") {
        settings.client.heartbeat_command.clone_from(&v);
        settings.server.heartbeat_command = v;
    }
    if let Some(v) = read("SIYI_HEARTBEAT_INTERVAL") {
        match parse_interval(&v) {
            Some(secs) => settings.server.heartbeat_interval_secs = secs,
            None => warn!(key = "SIYI_HEARTBEAT_INTERVAL", value = %v, "invalid interval env var, ignoring"),
        }
    }
    if let Some(v) = read("SIYI_RECONNECT_INTERVAL") {
        match parse_secs(&v) {
            Some(secs) => settings.client.reconnect_interval_secs = secs,
            None => warn!(key = "SIYI_RECONNECT_INTERVAL", value = %v, "invalid seconds env var, ignoring"),
        }
    }
    if let Some(v) = read("SIYI_REQUEST_TIMEOUT") {
        match parse_secs(&v).filter(|s| *s > 0.0) {
            Some(secs) => {
                settings.client.request_timeout_secs = secs;
                settings.server.request_timeout_secs = secs;
            }
            None => warn!(key = "SIYI_REQUEST_TIMEOUT", value = %v, "invalid seconds env var, ignoring"),
        }
    }
}

/// Reject values no engine can run with.
pub fn validate(settings: &SiyiSettings) -> Result<()> {
    let checks = [
        ("client.reconnectIntervalSecs", settings.client.reconnect_interval_secs, false),
        ("client.requestTimeoutSecs", settings.client.request_timeout_secs, true),
        ("server.heartbeatIntervalSecs", settings.server.heartbeat_interval_secs, false),
        ("server.requestTimeoutSecs", settings.server.request_timeout_secs, true),
    ];
    for (name, value, must_be_positive) in checks {
        if !value.is_finite() || value < 0.0 || (must_be_positive && value == 0.0) {
            return Err(SettingsError::InvalidValue(format!("{name} = {value}")));
        }
    }
    if settings.client.heartbeat_command.is_empty() || settings.server.heartbeat_command.is_empty() {
        return Err(SettingsError::InvalidValue("heartbeatCommand must not be empty".into()));
    }
    Ok(())
}

// ── Pure parsers ────────────────────────────────────────────────────────────

/// Parse a boolean (`true`/`1`/`yes`/`on`, `false`/`0`/`no`/`off`).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` within `[min, max]`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a non-negative, finite number of seconds.
pub fn parse_secs(val: &str) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (n.is_finite() && n >= 0.0).then_some(n)
}

/// Parse a heartbeat interval; `off`/`false`/`0` disable it.
pub fn parse_interval(val: &str) -> Option<f64> {
    if parse_bool(val) == Some(false) {
        return Some(0.0);
    }
    parse_secs(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use siyi_logging::capture_logs;
    use std::collections::HashMap;
    use std::time::Duration;
    use tracing::Level;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_keeps_siblings() {
        let merged = deep_merge(
            json!({"server": {"port": 8765, "host": "127.0.0.1"}}),
            json!({"server": {"port": 9000}}),
        );
        assert_eq!(merged, json!({"server": {"port": 9000, "host": "127.0.0.1"}}));
    }

    #[test]
    fn merge_null_is_skipped() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_arrays_replace() {
        let merged = deep_merge(json!({"a": [1, 2, 3]}), json!({"a": [4]}));
        assert_eq!(merged["a"], json!([4]));
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_file_layer(&dir.path().join("absent.json")).unwrap();
        assert_eq!(s, SiyiSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"client": {"agentId": "survival", "url": null}, "server": {"heartbeatIntervalSecs": 0}}"#,
        )
        .unwrap();
        let s = load_file_layer(&path).unwrap();
        assert_eq!(s.client.agent_id, "survival");
        assert_eq!(s.client.url, "ws://127.0.0.1:8765");
        assert_eq!(s.server.heartbeat_interval(), None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(load_file_layer(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();
        assert_matches!(load_file_layer(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn negative_interval_in_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"client": {"reconnectIntervalSecs": -1}}"#).unwrap();
        let s = load_file_layer(&path).unwrap();
        assert_matches!(validate(&s), Err(SettingsError::InvalidValue(ref m)) if m.contains("reconnectIntervalSecs"));
    }

    // ── env layer ───────────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut s = SiyiSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("SIYI_URL", "ws://backend:9000"),
                ("SIYI_AGENT_ID", "lobby"),
                ("SIYI_PORT", "9100"),
                ("SIYI_HEARTBEAT_COMMAND", "ping"),
                ("SIYI_RECONNECT_INTERVAL", "10"),
                ("SIYI_REQUEST_TIMEOUT", "2.5"),
            ]),
        );
        assert_eq!(s.client.url, "ws://backend:9000");
        assert_eq!(s.client.agent_id, "lobby");
        assert_eq!(s.server.port, 9100);
        assert_eq!(s.client.heartbeat_command, "ping");
        assert_eq!(s.server.heartbeat_command, "ping");
        assert_eq!(s.client.reconnect_interval(), Duration::from_secs(10));
        assert_eq!(s.server.request_timeout(), Duration::from_millis(2500));
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn env_off_disables_heartbeat() {
        let mut s = SiyiSettings::default();
        apply_overrides_from(&mut s, env(&[("SIYI_HEARTBEAT_INTERVAL", "off")]));
        assert_eq!(s.server.heartbeat_interval(), None);
    }

    #[test]
    fn invalid_env_is_warned_and_ignored() {
        let (logs, _guard) = capture_logs();
        let mut s = SiyiSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[("SIYI_PORT", "99999"), ("SIYI_REQUEST_TIMEOUT", "0")]),
        );
        assert_eq!(s.server.port, 8765);
        assert_eq!(s.client.request_timeout(), Duration::from_secs(30));
        assert!(logs.has_event(Level::WARN, "invalid port env var"));
        assert!(logs.has_event(Level::WARN, "invalid seconds env var"));
    }

    #[test]
    fn empty_env_value_is_ignored() {
        let mut s = SiyiSettings::default();
        apply_overrides_from(&mut s, env(&[("SIYI_HOST", "")]));
        assert_eq!(s.server.host, "127.0.0.1");
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_numbers() {
        assert_eq!(parse_u16_range("80", 1, 100), Some(80));
        assert_eq!(parse_u16_range("0", 1, 100), None);
        assert_eq!(parse_u16_range("abc", 0, 100), None);
        assert_eq!(parse_secs("1.5"), Some(1.5));
        assert_eq!(parse_secs("-1"), None);
        assert_eq!(parse_secs("NaN"), None);
        assert_eq!(parse_interval("0"), Some(0.0));
        assert_eq!(parse_interval("15"), Some(15.0));
    }
}
