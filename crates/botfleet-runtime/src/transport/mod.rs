//! Boundary to the wire protocol client.
//!
//! A [`Connector`] opens a [`TransportSession`]: an ordered stream of
//! [`TransportEvent`]s plus a [`TransportSink`] for outbound messages. The
//! controller never looks inside message payloads beyond forwarding the text.

pub mod tcp;

#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use botfleet_core::TransportError;
use botfleet_settings::BotSettings;
use tokio::sync::mpsc;

pub use tcp::TcpLineConnector;

/// Parameters for one connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Remote host for this attempt (the rotation's current endpoint).
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Login identity.
    pub username: String,
    /// Skip online authentication.
    pub offline: bool,
    /// Protocol version.
    pub version: String,
}

impl ConnectRequest {
    /// Request for `host` using the rest of `bot`'s settings.
    pub fn for_bot(bot: &BotSettings, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: bot.port,
            username: bot.username.clone(),
            offline: bot.offline,
            version: bot.version.clone(),
        }
    }
}

/// Lifecycle and data events emitted by a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The session is up and accepting messages.
    Connected,
    /// The remote side closed the session.
    Disconnected(String),
    /// The session ended locally or the underlying socket went away.
    Terminated(String),
    /// The remote service removed this client.
    Kicked(String),
    /// A classified failure. Benign kinds may be followed by more events.
    Error(TransportError),
    /// An inbound text line.
    Message(String),
}

/// Outbound half of a session.
#[async_trait]
pub trait TransportSink: Send + Sync {
    /// Send one text message.
    async fn send(&self, message: &str) -> Result<(), TransportError>;

    /// Close the session. Idempotent.
    async fn close(&self);
}

/// An open session. The event stream ending is equivalent to `Terminated`.
pub struct TransportSession {
    /// Inbound events, in order.
    pub events: mpsc::Receiver<TransportEvent>,
    /// Outbound messages.
    pub sink: Arc<dyn TransportSink>,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession").finish_non_exhaustive()
    }
}

/// Opens sessions. One connector is shared by every controller.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Start a session. Returning `Ok` does not mean connected: the
    /// controller waits for [`TransportEvent::Connected`].
    async fn open(&self, request: &ConnectRequest) -> Result<TransportSession, TransportError>;
}
