//! Frames pushed to subscribers.

use botfleet_core::InstanceId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a `status` frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// Whether the instance is online.
    pub connected: bool,
    /// Emission time, epoch milliseconds.
    pub ts: u64,
}

/// Body of a log frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    /// Originating instance.
    pub id: InstanceId,
    /// Log line.
    pub text: String,
    /// Timestamp supplied by the producer, epoch milliseconds.
    pub ts: u64,
}

/// One unit of delivery to a subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Instance meta, including the current `connected` flag.
    Meta(Map<String, Value>),
    /// Online/offline transition.
    Status(StatusPayload),
    /// Deduplicated log line.
    Log(LogPayload),
}

impl Frame {
    /// SSE event name. Log frames use the default (unnamed) event.
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            Self::Meta(_) => Some("meta"),
            Self::Status(_) => Some("status"),
            Self::Log(_) => None,
        }
    }

    /// JSON body of the frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Meta(meta) => serde_json::to_string(meta),
            Self::Status(status) => serde_json::to_string(status),
            Self::Log(log) => serde_json::to_string(log),
        }
    }

    /// Whether this is a status frame.
    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status(_))
    }

    /// Whether this is a log frame.
    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_names() {
        assert_eq!(Frame::Meta(Map::new()).event_name(), Some("meta"));
        let status = Frame::Status(StatusPayload {
            connected: true,
            ts: 1,
        });
        assert_eq!(status.event_name(), Some("status"));
        let log = Frame::Log(LogPayload {
            id: "bot-1".into(),
            text: "hi".into(),
            ts: 2,
        });
        assert_eq!(log.event_name(), None);
    }

    #[test]
    fn log_json_shape() {
        let log = Frame::Log(LogPayload {
            id: "bot-1".into(),
            text: "hi".into(),
            ts: 42,
        });
        let v: Value = serde_json::from_str(&log.to_json().unwrap()).unwrap();
        assert_eq!(v, json!({"id": "bot-1", "text": "hi", "ts": 42}));
    }

    #[test]
    fn status_json_shape() {
        let status = Frame::Status(StatusPayload {
            connected: false,
            ts: 7,
        });
        let v: Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(v, json!({"connected": false, "ts": 7}));
    }
}
