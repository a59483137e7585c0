//! Controller error types.

use botfleet_core::TransportError;

/// Errors surfaced by [`InstanceController`](crate::InstanceController).
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// `send` was called while the instance was not `Connected`.
    #[error("instance is not connected")]
    NotConnected,

    /// The transport rejected an outbound message.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The run loop went away while a request was in flight.
    #[error("instance is stopped")]
    Stopped,

    /// The run loop panicked.
    #[error("instance task failed: {0}")]
    TaskFailed(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ControllerError>;
