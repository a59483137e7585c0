//! Structured transport failures.
//!
//! Every error that crosses the transport boundary carries an explicit
//! [`TransportErrorKind`]. Reconnect and host-rotation decisions are made on
//! the kind alone.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Failure classes reported by a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// A network operation timed out.
    Timeout,
    /// The remote host refused the connection.
    Refused,
    /// No `connected` confirmation arrived within the connect timeout.
    ConnectTimeout,
    /// The session stopped answering keep-alive pings.
    PingTimeout,
    /// Malformed field or decode noise from the protocol codec.
    Codec,
    /// A protocol-level error that is not a decode glitch.
    Protocol,
    /// The session is already closed.
    Closed,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// Failures attributable to host reachability. These advance host rotation.
    #[must_use]
    pub fn is_endpoint_class(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Refused | Self::ConnectTimeout | Self::PingTimeout
        )
    }

    /// Noise that is logged quietly and never drives a state transition.
    #[must_use]
    pub fn is_benign(self) -> bool {
        matches!(self, Self::Codec)
    }

    /// Short label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Refused => "refused",
            Self::ConnectTimeout => "connect_timeout",
            Self::PingTimeout => "ping_timeout",
            Self::Codec => "codec",
            Self::Protocol => "protocol",
            Self::Closed => "closed",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by (or about) a transport session.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// Failure class.
    pub kind: TransportErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl TransportError {
    /// Build an error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// No `connected` event within `timeout_ms`.
    #[must_use]
    pub fn connect_timeout(timeout_ms: u64) -> Self {
        Self::new(
            TransportErrorKind::ConnectTimeout,
            format!("connect timed out after {timeout_ms}ms"),
        )
    }

    /// The session was closed before the operation could run.
    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Closed, message)
    }

    /// See [`TransportErrorKind::is_endpoint_class`].
    #[must_use]
    pub fn is_endpoint_class(&self) -> bool {
        self.kind.is_endpoint_class()
    }

    /// See [`TransportErrorKind::is_benign`].
    #[must_use]
    pub fn is_benign(&self) -> bool {
        self.kind.is_benign()
    }

    /// Short classification string for logging.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        self.kind.as_str()
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused => TransportErrorKind::Refused,
            io::ErrorKind::InvalidData => TransportErrorKind::Codec,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => TransportErrorKind::Closed,
            _ => TransportErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_class_kinds() {
        assert!(TransportErrorKind::Timeout.is_endpoint_class());
        assert!(TransportErrorKind::Refused.is_endpoint_class());
        assert!(TransportErrorKind::ConnectTimeout.is_endpoint_class());
        assert!(TransportErrorKind::PingTimeout.is_endpoint_class());
        assert!(!TransportErrorKind::Codec.is_endpoint_class());
        assert!(!TransportErrorKind::Protocol.is_endpoint_class());
        assert!(!TransportErrorKind::Other.is_endpoint_class());
    }

    #[test]
    fn only_codec_is_benign() {
        assert!(TransportErrorKind::Codec.is_benign());
        assert!(!TransportErrorKind::Protocol.is_benign());
        assert!(!TransportErrorKind::Refused.is_benign());
    }

    #[test]
    fn io_errors_map_to_kinds() {
        let refused: TransportError =
            io::Error::new(io::ErrorKind::ConnectionRefused, "nope").into();
        assert_eq!(refused.kind, TransportErrorKind::Refused);

        let timed_out: TransportError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(timed_out.is_endpoint_class());

        let reset: TransportError = io::Error::new(io::ErrorKind::ConnectionReset, "rst").into();
        assert_eq!(reset.kind, TransportErrorKind::Closed);

        let garbage: TransportError = io::Error::new(io::ErrorKind::InvalidData, "utf8").into();
        assert!(garbage.is_benign());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = TransportError::connect_timeout(30_000);
        assert_eq!(err.to_string(), "connect_timeout: connect timed out after 30000ms");
        assert_eq!(err.error_kind(), "connect_timeout");
    }
}
