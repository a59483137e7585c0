//! Lifecycle states and the snapshot exposed to callers.

use std::fmt;

use botfleet_core::InstanceId;
use serde::Serialize;

/// Connection lifecycle state of one instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Not running.
    Idle,
    /// Waiting for the transport to confirm a session.
    Connecting,
    /// Session is up.
    Connected,
    /// Session just ended; deciding whether to retry.
    Disconnected,
    /// Waiting out the reconnect delay.
    Reconnecting,
    /// Retry budget exhausted or retries disabled.
    Failed,
}

impl InstanceState {
    /// Whether a run loop is active in this state.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::Disconnected | Self::Reconnecting
        )
    }

    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    /// Instance id.
    pub id: InstanceId,
    /// Current state.
    pub state: InstanceState,
    /// Retries since the last successful connect.
    pub retry_count: u32,
    /// Endpoint the next (or current) attempt uses.
    pub endpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_states() {
        assert!(InstanceState::Connecting.is_running());
        assert!(InstanceState::Connected.is_running());
        assert!(InstanceState::Reconnecting.is_running());
        assert!(!InstanceState::Idle.is_running());
        assert!(!InstanceState::Failed.is_running());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snap = InstanceSnapshot {
            id: "instance-0".into(),
            state: InstanceState::Reconnecting,
            retry_count: 2,
            endpoint: "b.example".into(),
        };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["state"], "reconnecting");
        assert_eq!(v["retryCount"], 2);
    }
}
