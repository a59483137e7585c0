//! Hub error types.

use botfleet_core::InstanceId;

/// Errors returned by [`BroadcastHub`](crate::BroadcastHub) operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// No instance with this id is registered.
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// An instance with this id is already registered.
    #[error("instance already registered: {0}")]
    AlreadyRegistered(InstanceId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_instance() {
        let err = HubError::InstanceNotFound(InstanceId::from_raw("bot-9"));
        assert_eq!(err.to_string(), "instance not found: bot-9");
    }
}
