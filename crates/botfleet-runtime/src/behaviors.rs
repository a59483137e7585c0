//! Things a bot does on its own while connected: greet, announce, reply.

use std::sync::Arc;
use std::time::Duration;

use botfleet_settings::{AnnouncementSettings, AutoReplySettings};
use chrono::{Local, NaiveTime};
use regex::Regex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::TransportSink;

/// `[HH:MM:SS] text`.
pub fn format_greeting(text: &str, at: NaiveTime) -> String {
    format!("[{}] {text}", at.format("%H:%M:%S"))
}

/// Greeting stamped with the local wall clock.
pub fn greeting_now(text: &str) -> String {
    format_greeting(text, Local::now().time())
}

/// Compiled auto-reply rules. The first matching rule wins.
#[derive(Clone, Debug, Default)]
pub struct AutoReplies {
    rules: Vec<(Regex, String)>,
}

impl AutoReplies {
    /// Compile rules. Patterns that fail to compile are skipped with a warning.
    pub fn compile(settings: &[AutoReplySettings]) -> Self {
        let rules = settings
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(re) => Some((re, rule.reply.clone())),
                Err(e) => {
                    warn!(pattern = %rule.pattern, error = %e, "skipping invalid auto-reply pattern");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Reply for `message`, with `$1` / `${name}` expanded from captures.
    pub fn reply_for(&self, message: &str) -> Option<String> {
        self.rules.iter().find_map(|(re, template)| {
            let caps = re.captures(message)?;
            let mut out = String::new();
            caps.expand(template, &mut out);
            Some(out)
        })
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Start one repeating task per announcement. All stop when `cancel` fires.
pub fn spawn_announcements(
    announcements: &[AnnouncementSettings],
    sink: &Arc<dyn TransportSink>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    announcements
        .iter()
        .map(|ann| {
            let period = Duration::from_millis(ann.interval_ms);
            let text = ann.text.clone();
            let sink = Arc::clone(sink);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            match sink.send(&text).await {
                                Ok(()) => debug!(text = %text, "announcement sent"),
                                Err(e) => warn!(error = %e, "announcement failed"),
                            }
                        }
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::ScriptedConnector;
    use crate::transport::{ConnectRequest, Connector};

    #[test]
    fn greeting_has_clock_prefix() {
        let t = NaiveTime::from_hms_opt(9, 5, 7).unwrap();
        assert_eq!(format_greeting("hello all", t), "[09:05:07] hello all");
    }

    #[test]
    fn greeting_now_shape() {
        let g = greeting_now("hi");
        let re = Regex::new(r"^\[\d{2}:\d{2}:\d{2}\] hi$").unwrap();
        assert!(re.is_match(&g), "got {g}");
    }

    #[test]
    fn first_matching_rule_wins_with_captures() {
        let rules = AutoReplies::compile(&[
            AutoReplySettings {
                pattern: r"^(\w+) has requested to teleport to you".into(),
                reply: "/tpaccept $1".into(),
            },
            AutoReplySettings {
                pattern: r"teleport".into(),
                reply: "never reached".into(),
            },
        ]);
        assert_eq!(
            rules.reply_for("Steve has requested to teleport to you."),
            Some("/tpaccept Steve".into())
        );
        assert_eq!(rules.reply_for("nothing here"), None);
    }

    #[test]
    fn named_captures_expand() {
        let rules = AutoReplies::compile(&[AutoReplySettings {
            pattern: r"^hi (?P<who>\w+)$".into(),
            reply: "hello ${who}".into(),
        }]);
        assert_eq!(rules.reply_for("hi alex"), Some("hello alex".into()));
    }

    #[test]
    fn invalid_patterns_skipped() {
        let rules = AutoReplies::compile(&[AutoReplySettings {
            pattern: "(".into(),
            reply: "x".into(),
        }]);
        assert!(rules.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn announcements_repeat_until_cancelled() {
        let connector = ScriptedConnector::new();
        let session = connector
            .open(&ConnectRequest {
                host: "h".into(),
                port: 1,
                username: "u".into(),
                offline: true,
                version: "v".into(),
            })
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let tasks = spawn_announcements(
            &[AnnouncementSettings {
                text: "visit our shop".into(),
                interval_ms: 60_000,
            }],
            &session.sink,
            &cancel,
        );

        tokio::time::sleep(Duration::from_millis(59_000)).await;
        assert!(connector.sent().is_empty());
        tokio::time::sleep(Duration::from_millis(62_000)).await;
        assert_eq!(connector.sent().len(), 2);

        cancel.cancel();
        for task in tasks {
            task.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(600_000)).await;
        assert_eq!(connector.sent().len(), 2);
    }
}
