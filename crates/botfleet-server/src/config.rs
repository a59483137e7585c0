//! Server configuration.

use std::time::Duration;

use botfleet_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Bind address and stream options for the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Interval between SSE keep-alive comments, in seconds.
    pub keep_alive_secs: u64,
}

impl ServerConfig {
    /// Keep-alive interval as a `Duration`.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            keep_alive_secs: 15,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            keep_alive_secs: settings.keep_alive_secs,
        }
    }
}
