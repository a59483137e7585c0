//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Normalise the file into the canonical `{server, logging, bots}` shape
//! 2. Deep-merge it over compiled [`FleetSettings::default()`]
//! 3. Apply `BOTFLEET_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Accepted file shapes: the canonical object, a single bot object, or an
//! array of bot objects. A bot object may be flat (`{"host": ...}`) or use
//! the nested `{"bot": {...}, "features": {...}}` layout.

use std::path::Path;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{FleetSettings, LogFormat};

/// Load, override, and validate settings from `path`.
pub fn load_settings_from_path(path: &Path) -> Result<FleetSettings> {
    debug!(?path, "loading settings from file");
    let content = std::fs::read_to_string(path)?;
    let mut settings = parse_settings(&content)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Parse config text into settings. No env overrides, no validation.
pub fn parse_settings(content: &str) -> Result<FleetSettings> {
    let raw: Value = serde_json::from_str(content)?;
    let user = normalize(raw)?;
    let defaults = serde_json::to_value(FleetSettings::default())?;
    let merged = deep_merge(defaults, user);
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

fn normalize(raw: Value) -> Result<Value> {
    match raw {
        Value::Array(items) => Ok(json!({ "bots": normalize_bots(items) })),
        Value::Object(mut map) => {
            if let Some(bots) = map.remove("bots") {
                let Value::Array(items) = bots else {
                    return Err(SettingsError::InvalidValue("`bots` must be an array".into()));
                };
                let _ = map.insert("bots".into(), Value::Array(normalize_bots(items)));
                return Ok(Value::Object(map));
            }
            // Single bot; fleet-wide sections are lifted to the top level.
            let mut root = Map::new();
            for key in ["server", "logging"] {
                if let Some(section) = map.remove(key) {
                    if section.is_object() {
                        let _ = root.insert(key.into(), section);
                    }
                }
            }
            let _ = root.insert(
                "bots".into(),
                Value::Array(vec![normalize_bot(Value::Object(map))]),
            );
            Ok(Value::Object(root))
        }
        _ => Err(SettingsError::InvalidValue(
            "config must be an object or an array of bot objects".into(),
        )),
    }
}

fn normalize_bots(items: Vec<Value>) -> Vec<Value> {
    items.into_iter().map(normalize_bot).collect()
}

/// Server notice sent when another player asks to teleport to this bot.
const TELEPORT_REQUEST_PATTERN: &str = r"^\[系統\] ([A-Za-z0-9_]+) 想要你傳送到 該玩家 的位置";
/// Command that accepts a pending teleport request.
const TELEPORT_ACCEPT_COMMAND: &str = "/tok";

/// Flatten the nested `{"bot": ..., "features": ...}` layout into a flat bot.
///
/// `features.teleport` (enabled unless set to `false`) becomes an auto reply
/// accepting teleport requests.
fn normalize_bot(value: Value) -> Value {
    let Value::Object(mut entry) = value else {
        return value;
    };
    let Some(Value::Object(bot)) = entry.remove("bot") else {
        return Value::Object(entry);
    };

    let features = match entry.remove("features") {
        Some(Value::Object(f)) => f,
        _ => Map::new(),
    };
    let top_level_ads = entry.remove("advertisement");

    let mut flat = entry;
    flat.extend(bot);

    if let Some(Value::Object(auto)) = features.get("autoReconnect") {
        let mut reconnect = Map::new();
        let enabled = auto.get("enabled").and_then(Value::as_bool).unwrap_or(false);
        let _ = reconnect.insert("enabled".into(), Value::Bool(enabled));
        if let Some(max) = auto.get("maxRetries") {
            let _ = reconnect.insert("maxRetries".into(), max.clone());
        }
        if let Some(delay) = auto.get("delay") {
            let _ = reconnect.insert("delayMs".into(), delay.clone());
        }
        let _ = flat.insert("reconnect".into(), Value::Object(reconnect));
    }

    let ads = features.get("advertisement").cloned().or(top_level_ads);
    if let Some(Value::Object(ads)) = ads {
        let enabled = ads.get("enabled").and_then(Value::as_bool).unwrap_or(true);
        if let (true, Some(Value::Array(messages))) = (enabled, ads.get("messages")) {
            let announcements: Vec<Value> = messages
                .iter()
                .filter_map(|m| {
                    let text = m.get("text")?.as_str()?;
                    let interval = m.get("interval")?.as_u64()?;
                    Some(json!({ "text": text, "intervalMs": interval }))
                })
                .collect();
            let _ = flat.insert("announcements".into(), Value::Array(announcements));
        }
    }

    let teleport = features
        .get("teleport")
        .and_then(|t| t.get("enabled"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    if teleport {
        let rule = json!({ "pattern": TELEPORT_REQUEST_PATTERN, "reply": TELEPORT_ACCEPT_COMMAND });
        match flat.get_mut("autoReplies") {
            Some(Value::Array(rules)) => rules.push(rule),
            _ => {
                let _ = flat.insert("autoReplies".into(), Value::Array(vec![rule]));
            }
        }
        debug!("nested layout: teleport requests mapped to an auto reply");
    }

    Value::Object(flat)
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut FleetSettings) {
    if let Some(v) = read_env_string("BOTFLEET_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env("BOTFLEET_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("BOTFLEET_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env("BOTFLEET_LOG_FORMAT", parse_log_format) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse `pretty` / `json` (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "pretty" | "text" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env<T>(name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let val = std::env::var(name).ok()?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = json!({"server": {"port": 8080, "host": "0.0.0.0"}});
        let source = json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_skips_null_and_replaces_arrays() {
        let target = json!({"a": 1, "list": [1, 2, 3]});
        let source = json!({"a": null, "list": [9]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["list"], json!([9]));
    }

    // ── shapes ──────────────────────────────────────────────────────

    #[test]
    fn canonical_shape() {
        let s = parse_settings(
            r#"{"server":{"port":9000},"bots":[{"host":"h","username":"a"},{"host":"h","username":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.bots.len(), 2);
        assert_eq!(s.bots[1].username, "b");
        assert_eq!(s.bots[1].port, 19_132);
    }

    #[test]
    fn array_of_flat_bots() {
        let s = parse_settings(r#"[{"host":"h1","username":"a"},{"host":"h2","username":"b"}]"#)
            .unwrap();
        assert_eq!(s.bots.len(), 2);
        assert_eq!(s.bots[0].host, "h1");
        assert_eq!(s.server.port, 8080);
    }

    #[test]
    fn single_flat_bot_lifts_logging() {
        let s = parse_settings(r#"{"host":"h","username":"u","logging":{"level":"debug"}}"#)
            .unwrap();
        assert_eq!(s.bots.len(), 1);
        assert_eq!(s.logging.level, "debug");
    }

    #[test]
    fn nested_layout_is_flattened() {
        let s = parse_settings(
            r#"{
                "bot": {"host": "play.example", "port": 19133, "username": "xi", "offline": true},
                "features": {
                    "autoReconnect": {"enabled": true, "maxRetries": 4, "delay": 2000},
                    "advertisement": {"enabled": true, "messages": [{"text": "hello", "interval": 60000}]}
                }
            }"#,
        )
        .unwrap();
        let bot = &s.bots[0];
        assert_eq!(bot.host, "play.example");
        assert_eq!(bot.port, 19_133);
        assert!(bot.offline);
        assert!(bot.reconnect.enabled);
        assert_eq!(bot.reconnect.max_retries, 4);
        assert_eq!(bot.reconnect.delay_ms, 2000);
        assert_eq!(bot.announcements.len(), 1);
        assert_eq!(bot.announcements[0].interval_ms, 60_000);
    }

    #[test]
    fn nested_layout_without_enabled_disables_reconnect() {
        let s = parse_settings(
            r#"{"bot":{"host":"h","username":"u"},"features":{"autoReconnect":{"maxRetries":2}}}"#,
        )
        .unwrap();
        assert!(!s.bots[0].reconnect.enabled);
        assert_eq!(s.bots[0].reconnect.max_retries, 2);
    }

    #[test]
    fn nested_layout_accepts_teleport_requests_by_default() {
        let s = parse_settings(
            r#"{"bot":{"host":"h","username":"u","autoReplies":[{"pattern":"^hi$","reply":"hey"}]}}"#,
        )
        .unwrap();
        let replies = &s.bots[0].auto_replies;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].reply, "hey");
        assert_eq!(replies[1].reply, "/tok");
        let re = regex::Regex::new(&replies[1].pattern).unwrap();
        assert!(re.is_match("[系統] Steve_01 想要你傳送到 該玩家 的位置"));
        assert!(!re.is_match("[系統] Steve_01 想要傳送到 你 的位置"));
    }

    #[test]
    fn nested_layout_with_teleport_disabled_adds_no_reply() {
        let s = parse_settings(
            r#"{"bot":{"host":"h","username":"u"},"features":{"teleport":{"enabled":false}}}"#,
        )
        .unwrap();
        assert!(s.bots[0].auto_replies.is_empty());
    }

    #[test]
    fn flat_layout_gets_no_teleport_reply() {
        let s = parse_settings(r#"{"bots":[{"host":"h","username":"u"}]}"#).unwrap();
        assert!(s.bots[0].auto_replies.is_empty());
    }

    #[test]
    fn disabled_advertisement_yields_no_announcements() {
        let s = parse_settings(
            r#"{"bot":{"host":"h","username":"u"},"features":{"advertisement":{"enabled":false,"messages":[{"text":"x","interval":5000}]}}}"#,
        )
        .unwrap();
        assert!(s.bots[0].announcements.is_empty());
    }

    #[test]
    fn scalar_config_rejected() {
        assert!(matches!(
            parse_settings("42"),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn bots_must_be_array() {
        assert!(parse_settings(r#"{"bots": {"host": "h"}}"#).is_err());
    }

    #[test]
    fn invalid_json_is_json_error() {
        assert!(matches!(parse_settings("{nope"), Err(SettingsError::Json(_))));
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn load_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"host":"h","username":""}}]"#).unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Missing {
                bot: 0,
                field: "username"
            }
        ));
    }

    #[test]
    fn load_from_file_ok() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"host":"h","username":"u"}}"#).unwrap();
        let s = load_settings_from_path(file.path()).unwrap();
        assert_eq!(s.bots[0].username, "u");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_settings_from_path(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }

    // ── env parsing ─────────────────────────────────────────────────

    #[test]
    fn parse_port_range() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("abc", 1, 65535), None);
    }

    #[test]
    fn parse_format() {
        assert_eq!(parse_log_format("JSON"), Some(LogFormat::Json));
        assert_eq!(parse_log_format("pretty"), Some(LogFormat::Pretty));
        assert_eq!(parse_log_format("xml"), None);
    }
}
