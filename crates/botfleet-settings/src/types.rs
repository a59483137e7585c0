//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a config
//! file only has to name the fields it changes.

use std::collections::BTreeMap;

use botfleet_core::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_RETRIES, DEFAULT_PROTOCOL_VERSION,
    DEFAULT_RECONNECT_DELAY_MS, DEFAULT_REMOTE_PORT, MIN_ANNOUNCEMENT_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetSettings {
    /// HTTP gateway settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
    /// One entry per managed bot, launched in order.
    pub bots: Vec<BotSettings>,
}

impl FleetSettings {
    /// Check every recognised option; the first problem wins.
    pub fn validate(&self) -> Result<()> {
        if self.bots.is_empty() {
            return Err(SettingsError::InvalidValue(
                "at least one bot must be configured".into(),
            ));
        }
        if self.server.subscriber_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.subscriberQueue must be greater than zero".into(),
            ));
        }
        for (index, bot) in self.bots.iter().enumerate() {
            bot.validate(index)?;
        }
        Ok(())
    }
}

// ── Server ──────────────────────────────────────────────────────────────────

/// Gateway network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Capacity of each subscriber's pending log queue.
    pub subscriber_queue: usize,
    /// Dropped log frames tolerated before a slow subscriber is evicted.
    pub max_subscriber_drops: u64,
    /// Interval between SSE keep-alive comments.
    pub keep_alive_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            subscriber_queue: 256,
            max_subscriber_drops: 100,
            keep_alive_secs: 15,
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────────────────

/// Output format for the log subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Log output settings. `RUST_LOG` overrides `level` and `modules`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Per-module level overrides, e.g. `{"botfleet_hub": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            modules: BTreeMap::new(),
        }
    }
}

// ── Bots ────────────────────────────────────────────────────────────────────

/// Automatic reconnect policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Whether failures are retried at all.
    pub enabled: bool,
    /// Retries before the instance enters `Failed`.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
            delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

/// A message repeated on a fixed interval while connected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementSettings {
    /// Text to send.
    pub text: String,
    /// Interval between sends.
    pub interval_ms: u64,
}

/// A reply sent when an inbound message matches `pattern`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoReplySettings {
    /// Regular expression matched against each inbound message.
    pub pattern: String,
    /// Reply template; `$1`, `${name}` expand capture groups.
    pub reply: String,
}

/// One managed bot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotSettings {
    /// Primary remote host. Required.
    pub host: String,
    /// Fallback hosts tried in order after `host` on endpoint failures.
    pub hosts: Vec<String>,
    /// Remote port, shared by every host.
    pub port: u16,
    /// Login identity. Required.
    pub username: String,
    /// Skip online authentication.
    pub offline: bool,
    /// Protocol version handed to the transport.
    pub version: String,
    /// How long to wait for the transport to confirm the connection.
    pub connect_timeout_ms: u64,
    /// Optional friendly name exposed in instance meta.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Reconnect policy.
    pub reconnect: ReconnectSettings,
    /// Sent once after every successful connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    /// Periodic messages.
    pub announcements: Vec<AnnouncementSettings>,
    /// Pattern-triggered replies.
    pub auto_replies: Vec<AutoReplySettings>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            hosts: Vec::new(),
            port: DEFAULT_REMOTE_PORT,
            username: String::new(),
            offline: false,
            version: DEFAULT_PROTOCOL_VERSION.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            display_name: None,
            reconnect: ReconnectSettings::default(),
            greeting: None,
            announcements: Vec::new(),
            auto_replies: Vec::new(),
        }
    }
}

impl BotSettings {
    /// Rotation candidates: `host` first, then `hosts` without duplicates.
    pub fn endpoints(&self) -> Vec<String> {
        let mut out = vec![self.host.clone()];
        for host in &self.hosts {
            if !host.trim().is_empty() && !out.contains(host) {
                out.push(host.clone());
            }
        }
        out
    }

    fn validate(&self, index: usize) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::Missing {
                bot: index,
                field: "host",
            });
        }
        if self.username.trim().is_empty() {
            return Err(SettingsError::Missing {
                bot: index,
                field: "username",
            });
        }
        if self.port == 0 {
            return Err(SettingsError::InvalidValue(format!(
                "bot {index}: port must be between 1 and 65535"
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(format!(
                "bot {index}: connectTimeoutMs must be greater than zero"
            )));
        }
        for (i, ann) in self.announcements.iter().enumerate() {
            if ann.text.is_empty() {
                return Err(SettingsError::InvalidValue(format!(
                    "bot {index}: announcement {i} has empty text"
                )));
            }
            if ann.interval_ms < MIN_ANNOUNCEMENT_INTERVAL_MS {
                return Err(SettingsError::InvalidValue(format!(
                    "bot {index}: announcement {i} interval must be >= {MIN_ANNOUNCEMENT_INTERVAL_MS}ms"
                )));
            }
        }
        for (i, rule) in self.auto_replies.iter().enumerate() {
            if let Err(e) = regex::Regex::new(&rule.pattern) {
                return Err(SettingsError::InvalidValue(format!(
                    "bot {index}: autoReply {i} pattern is invalid: {e}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(host: &str, username: &str) -> BotSettings {
        BotSettings {
            host: host.into(),
            username: username.into(),
            ..BotSettings::default()
        }
    }

    fn fleet(bots: Vec<BotSettings>) -> FleetSettings {
        FleetSettings {
            bots,
            ..FleetSettings::default()
        }
    }

    #[test]
    fn bot_defaults() {
        let b = BotSettings::default();
        assert_eq!(b.port, 19_132);
        assert_eq!(b.version, "1.21.100");
        assert_eq!(b.connect_timeout_ms, 30_000);
        assert!(b.reconnect.enabled);
        assert_eq!(b.reconnect.max_retries, 10);
        assert_eq!(b.reconnect.delay_ms, 5_000);
    }

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 8080);
        assert_eq!(s.subscriber_queue, 256);
    }

    #[test]
    fn endpoints_put_primary_first_and_dedupe() {
        let mut b = bot("a.example", "x");
        b.hosts = vec!["b.example".into(), "a.example".into(), " ".into(), "c.example".into()];
        assert_eq!(b.endpoints(), vec!["a.example", "b.example", "c.example"]);
    }

    #[test]
    fn valid_fleet_passes() {
        assert!(fleet(vec![bot("h", "u")]).validate().is_ok());
    }

    #[test]
    fn empty_fleet_rejected() {
        assert!(matches!(
            fleet(vec![]).validate(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn missing_host_names_the_bot() {
        let err = fleet(vec![bot("h", "u"), bot("", "u")]).validate().unwrap_err();
        assert!(matches!(err, SettingsError::Missing { bot: 1, field: "host" }));
    }

    #[test]
    fn missing_username_rejected() {
        let err = fleet(vec![bot("h", "  ")]).validate().unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Missing {
                bot: 0,
                field: "username"
            }
        ));
    }

    #[test]
    fn short_announcement_interval_rejected() {
        let mut b = bot("h", "u");
        b.announcements.push(AnnouncementSettings {
            text: "hi".into(),
            interval_ms: 500,
        });
        assert!(fleet(vec![b]).validate().is_err());
    }

    #[test]
    fn bad_regex_rejected() {
        let mut b = bot("h", "u");
        b.auto_replies.push(AutoReplySettings {
            pattern: "(unclosed".into(),
            reply: "/tok".into(),
        });
        let err = fleet(vec![b]).validate().unwrap_err();
        assert!(err.to_string().contains("autoReply 0"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let b: BotSettings =
            serde_json::from_str(r#"{"host":"h","username":"u","reconnect":{"maxRetries":3}}"#)
                .unwrap();
        assert_eq!(b.port, 19_132);
        assert_eq!(b.reconnect.max_retries, 3);
        assert_eq!(b.reconnect.delay_ms, 5_000);
        assert!(b.reconnect.enabled);
    }
}
